//! Test doubles
//!
//! An in-process fake plugin exposed through a fake library provider, plus a
//! frame that records what the host asks of it. Fake plugin state is thread
//! local, so tests running in parallel do not see each other.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::ffi::{CStr, c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::rc::{Rc, Weak};
use std::time::Duration;

use fos_npapi::*;
use fos_plugins::host::{ListenerId, LoadClient, LoadHandle, NativeWindow, ResourceResponse, ScriptValue};
use fos_plugins::library::{EntryPoints, LibraryProvider, NativeLibrary};
use fos_plugins::{
    FrameClient, InstanceParams, IntRect, ManualClock, ModuleError, PluginModule, PluginView, PluginWindowSpec,
    ResourceRequest, Scheduler,
};
use url::Url;

// ============================================================================
// Fake plugin
// ============================================================================

/// How the fake plugin behaves.
#[derive(Clone)]
pub struct PluginBehavior {
    pub mime_description: &'static CStr,
    pub name: &'static CStr,
    pub description: &'static CStr,
    pub table_version: u16,
    pub windowless: bool,
    pub newstream_result: NPError,
    pub transfer_mode: u16,
    pub write_ready: i32,
    /// `None` consumes everything offered
    pub write_result: Option<i32>,
    pub handles_events: bool,
}

impl Default for PluginBehavior {
    fn default() -> Self {
        Self {
            mime_description: c"application/x-fake:fake:Fake document",
            name: c"Fake Plugin",
            description: c"Fake Plugin 1.2",
            table_version: NP_HOST_VERSION,
            windowless: false,
            newstream_result: NPERR_NO_ERROR,
            transfer_mode: NP_NORMAL,
            write_ready: 1 << 16,
            write_result: None,
            handles_events: true,
        }
    }
}

/// Last window record the plugin saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeenWindow {
    pub has_window: bool,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub clip: NPRect,
}

thread_local! {
    static BEHAVIOR: RefCell<PluginBehavior> = RefCell::new(PluginBehavior::default());
    static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static HOST: Cell<Option<NPNetscapeFuncs>> = const { Cell::new(None) };
    static WINDOWS: RefCell<Vec<SeenWindow>> = const { RefCell::new(Vec::new()) };
    static RECEIVED: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
    static AS_FILE: RefCell<Option<Vec<u8>>> = const { RefCell::new(None) };
    static EVENTS: RefCell<Vec<NPEventType>> = const { RefCell::new(Vec::new()) };
    static LAST_STREAM: Cell<*mut NPStream> = const { Cell::new(ptr::null_mut()) };
    static EVENT_HOOK: RefCell<Option<Box<dyn FnMut(NPEventType)>>> = const { RefCell::new(None) };
}

pub fn set_behavior(behavior: PluginBehavior) {
    BEHAVIOR.with(|b| *b.borrow_mut() = behavior);
}

fn behavior() -> PluginBehavior {
    BEHAVIOR.with(|b| b.borrow().clone())
}

fn log(entry: impl Into<String>) {
    LOG.with(|l| l.borrow_mut().push(entry.into()));
}

/// Calls the fake plugin received, in order.
pub fn calls() -> Vec<String> {
    LOG.with(|l| l.borrow().clone())
}

pub fn clear_calls() {
    LOG.with(|l| l.borrow_mut().clear());
}

pub fn count_calls(prefix: &str) -> usize {
    calls().iter().filter(|c| c.starts_with(prefix)).count()
}

/// Host table the plugin was initialized with.
pub fn host() -> NPNetscapeFuncs {
    HOST.with(Cell::get).expect("plugin not initialized")
}

pub fn windows() -> Vec<SeenWindow> {
    WINDOWS.with(|w| w.borrow().clone())
}

pub fn received() -> Vec<u8> {
    RECEIVED.with(|r| r.borrow().clone())
}

pub fn as_file_contents() -> Option<Vec<u8>> {
    AS_FILE.with(|f| f.borrow().clone())
}

pub fn events() -> Vec<NPEventType> {
    EVENTS.with(|e| e.borrow().clone())
}

/// Run `hook` inside every event call the plugin receives, so a test can
/// call back into the host the way a real plugin would.
pub fn on_event(hook: impl FnMut(NPEventType) + 'static) {
    EVENT_HOOK.with(|h| *h.borrow_mut() = Some(Box::new(hook)));
}

/// Stream record from the latest `newstream`.
pub fn last_stream() -> *mut NPStream {
    LAST_STREAM.with(Cell::get)
}

fn reset_plugin() {
    set_behavior(PluginBehavior::default());
    clear_calls();
    HOST.with(|h| h.set(None));
    WINDOWS.with(|w| w.borrow_mut().clear());
    RECEIVED.with(|r| r.borrow_mut().clear());
    AS_FILE.with(|f| *f.borrow_mut() = None);
    EVENTS.with(|e| e.borrow_mut().clear());
    LAST_STREAM.with(|s| s.set(ptr::null_mut()));
    EVENT_HOOK.with(|h| *h.borrow_mut() = None);
}

unsafe fn lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::from("<null>");
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

unsafe extern "C" fn fake_get_mime_description() -> *const c_char {
    BEHAVIOR.with(|b| b.borrow().mime_description.as_ptr())
}

unsafe extern "C" fn fake_get_value(_future: *mut c_void, variable: NPPVariable, value: *mut c_void) -> NPError {
    let text = match variable {
        NPPV_PLUGIN_NAME_STRING => BEHAVIOR.with(|b| b.borrow().name.as_ptr()),
        NPPV_PLUGIN_DESCRIPTION_STRING => BEHAVIOR.with(|b| b.borrow().description.as_ptr()),
        _ => return NPERR_GENERIC_ERROR,
    };
    unsafe { *(value as *mut *const c_char) = text };
    NPERR_NO_ERROR
}

unsafe fn fill_plugin_funcs(funcs: *mut NPPluginFuncs) {
    let funcs = unsafe { &mut *funcs };
    funcs.version = behavior().table_version;
    funcs.newp = Some(fake_new);
    funcs.destroy = Some(fake_destroy);
    funcs.setwindow = Some(fake_set_window);
    funcs.newstream = Some(fake_new_stream);
    funcs.destroystream = Some(fake_destroy_stream);
    funcs.asfile = Some(fake_as_file);
    funcs.writeready = Some(fake_write_ready);
    funcs.write = Some(fake_write);
    funcs.event = Some(fake_event);
    funcs.urlnotify = Some(fake_url_notify);
}

#[cfg(all(unix, not(target_os = "macos")))]
unsafe extern "C" fn fake_initialize(host: *mut NPNetscapeFuncs, plugin: *mut NPPluginFuncs) -> NPError {
    log("initialize");
    unsafe {
        HOST.with(|h| h.set(Some(*host)));
        fill_plugin_funcs(plugin);
    }
    NPERR_NO_ERROR
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
unsafe extern "C" fn fake_initialize(host: *mut NPNetscapeFuncs) -> NPError {
    log("initialize");
    unsafe { HOST.with(|h| h.set(Some(*host))) };
    NPERR_NO_ERROR
}

unsafe extern "C" fn fake_get_entry_points(plugin: *mut NPPluginFuncs) -> NPError {
    unsafe { fill_plugin_funcs(plugin) };
    NPERR_NO_ERROR
}

unsafe extern "C" fn fake_shutdown() -> NPError {
    log("shutdown");
    NPERR_NO_ERROR
}

unsafe extern "C" fn fake_new(
    _mime: NPMIMEType,
    npp: NPP,
    mode: u16,
    argc: i16,
    argn: *mut *mut c_char,
    _argv: *mut *mut c_char,
    _saved: *mut NPSavedData,
) -> NPError {
    let names: Vec<String> = (0..argc.max(0) as usize)
        .map(|i| unsafe { lossy(*argn.add(i)) })
        .collect();
    log(format!("new mode={} args={}", mode, names.join(",")));
    if behavior().windowless {
        let setvalue = host().setvalue.expect("setvalue");
        unsafe { setvalue(npp, NPPV_PLUGIN_WINDOW_BOOL, ptr::null_mut()) };
    }
    NPERR_NO_ERROR
}

unsafe extern "C" fn fake_destroy(_npp: NPP, _save: *mut *mut NPSavedData) -> NPError {
    log("destroy");
    NPERR_NO_ERROR
}

unsafe extern "C" fn fake_set_window(_npp: NPP, window: *mut NPWindow) -> NPError {
    let window = unsafe { &*window };
    log("setwindow");
    WINDOWS.with(|w| {
        w.borrow_mut().push(SeenWindow {
            has_window: !window.window.is_null(),
            x: window.x,
            y: window.y,
            width: window.width,
            height: window.height,
            clip: window.clip_rect,
        })
    });
    NPERR_NO_ERROR
}

unsafe extern "C" fn fake_new_stream(
    _npp: NPP,
    mime_type: NPMIMEType,
    stream: *mut NPStream,
    _seekable: NPBool,
    stype: *mut u16,
) -> NPError {
    let (mime, url) = unsafe { (lossy(mime_type), lossy((*stream).url)) };
    log(format!("newstream {} {}", mime, url));
    LAST_STREAM.with(|s| s.set(stream));
    let behavior = behavior();
    unsafe { *stype = behavior.transfer_mode };
    behavior.newstream_result
}

unsafe extern "C" fn fake_destroy_stream(_npp: NPP, _stream: *mut NPStream, reason: NPReason) -> NPError {
    log(format!("destroystream {}", reason));
    NPERR_NO_ERROR
}

unsafe extern "C" fn fake_as_file(_npp: NPP, _stream: *mut NPStream, fname: *const c_char) {
    log("asfile");
    let path = PathBuf::from(unsafe { lossy(fname) });
    AS_FILE.with(|f| *f.borrow_mut() = std::fs::read(path).ok());
}

unsafe extern "C" fn fake_write_ready(_npp: NPP, _stream: *mut NPStream) -> i32 {
    behavior().write_ready
}

unsafe extern "C" fn fake_write(_npp: NPP, _stream: *mut NPStream, offset: i32, len: i32, buffer: *mut c_void) -> i32 {
    log(format!("write {} {}", offset, len));
    let consumed = behavior().write_result.unwrap_or(len);
    if consumed > 0 {
        let bytes = unsafe { std::slice::from_raw_parts(buffer as *const u8, consumed.min(len) as usize) };
        RECEIVED.with(|r| r.borrow_mut().extend_from_slice(bytes));
    }
    consumed
}

unsafe extern "C" fn fake_event(_npp: NPP, event: *mut c_void) -> i16 {
    let event = unsafe { &*(event as *const NPEvent) };
    let event_type = event.event_type;
    EVENTS.with(|e| e.borrow_mut().push(event_type));
    // Taken out while it runs: the hook may re-enter the plugin.
    if let Some(mut hook) = EVENT_HOOK.with(|h| h.borrow_mut().take()) {
        hook(event_type);
        EVENT_HOOK.with(|h| {
            let mut slot = h.borrow_mut();
            if slot.is_none() {
                *slot = Some(hook);
            }
        });
    }
    behavior().handles_events as i16
}

unsafe extern "C" fn fake_url_notify(_npp: NPP, url: *const c_char, reason: NPReason, _notify_data: *mut c_void) {
    log(format!("urlnotify {} {}", unsafe { lossy(url) }, reason));
}

// ============================================================================
// Library provider
// ============================================================================

struct FakeLibrary {
    path: PathBuf,
}

impl NativeLibrary for FakeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_points(&self) -> Result<EntryPoints, ModuleError> {
        Ok(EntryPoints {
            initialize: fake_initialize,
            shutdown: fake_shutdown,
            get_mime_description: fake_get_mime_description,
            get_entry_points: Some(fake_get_entry_points),
            get_value: Some(fake_get_value),
        })
    }
}

/// Serves the fake plugin for every path.
#[derive(Default)]
pub struct FakeProvider {
    pub opened: Cell<usize>,
}

impl LibraryProvider for FakeProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, ModuleError> {
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(FakeLibrary { path: path.to_path_buf() }))
    }
}

// ============================================================================
// Frame
// ============================================================================

#[derive(Default)]
pub struct FakeLoad {
    pub cancelled: Cell<bool>,
    pub deferred: Cell<bool>,
}

struct LoadRef(Rc<FakeLoad>);

impl LoadHandle for LoadRef {
    fn cancel(&self) {
        self.0.cancelled.set(true);
    }

    fn set_defers_loading(&self, defers: bool) {
        self.0.deferred.set(defers);
    }
}

pub struct StartedLoad {
    pub request: ResourceRequest,
    pub client: Weak<dyn LoadClient>,
    pub handle: Rc<FakeLoad>,
}

impl StartedLoad {
    pub fn client(&self) -> Rc<dyn LoadClient> {
        self.client.upgrade().expect("load client gone")
    }

    /// Answer the load with `body` in one chunk.
    pub fn respond(&self, mime_type: &str, body: &[u8]) {
        let client = self.client();
        let response = ResourceResponse::new(self.request.url.clone(), mime_type).with_content_length(body.len() as u64);
        client.did_receive_response(&response);
        client.did_receive_data(body);
        client.did_finish_loading();
    }
}

#[derive(Default)]
pub struct FakeWindowState {
    pub visible: Cell<bool>,
    pub geometry: Cell<IntRect>,
    pub clip: Cell<IntRect>,
    /// Every clip applied, in order
    pub clips: RefCell<Vec<IntRect>>,
    pub default_depth: Cell<bool>,
    pub messages: RefCell<Vec<u32>>,
}

struct FakeWindow(Rc<FakeWindowState>);

impl NativeWindow for FakeWindow {
    fn handle(&self) -> *mut c_void {
        Rc::as_ptr(&self.0) as *mut c_void
    }

    fn set_geometry(&self, rect: IntRect) {
        self.0.geometry.set(rect);
    }

    fn set_clip(&self, clip: IntRect) {
        self.0.clip.set(clip);
        self.0.clips.borrow_mut().push(clip);
    }

    fn set_visible(&self, visible: bool) {
        self.0.visible.set(visible);
    }

    fn is_visible(&self) -> bool {
        self.0.visible.get()
    }

    fn dispatch_message(&self, message: u32, _wparam: usize, _lparam: isize) -> bool {
        self.0.messages.borrow_mut().push(message);
        true
    }
}

pub struct FakeFrame {
    pub base: Url,
    pub loads: RefCell<Vec<StartedLoad>>,
    pub refuse_loads: Cell<bool>,
    pub navigations: RefCell<Vec<(String, String)>>,
    pub scripts: RefCell<Vec<String>>,
    pub script_result: RefCell<ScriptValue>,
    pub can_start_media: Cell<bool>,
    pub media_listeners: RefCell<Vec<Box<dyn FnOnce()>>>,
    pub invalidations: RefCell<Vec<IntRect>>,
    pub window: Rc<FakeWindowState>,
    pub failed_starts: Cell<u32>,
    pub status_text: RefCell<String>,
    pub cookies: RefCell<Option<String>>,
}

impl Default for FakeFrame {
    fn default() -> Self {
        Self {
            base: Url::parse("http://example.com/page.html").expect("base url"),
            loads: RefCell::new(Vec::new()),
            refuse_loads: Cell::new(false),
            navigations: RefCell::new(Vec::new()),
            scripts: RefCell::new(Vec::new()),
            script_result: RefCell::new(ScriptValue::Void),
            can_start_media: Cell::new(true),
            media_listeners: RefCell::new(Vec::new()),
            invalidations: RefCell::new(Vec::new()),
            window: Rc::new(FakeWindowState::default()),
            failed_starts: Cell::new(0),
            status_text: RefCell::new(String::new()),
            cookies: RefCell::new(None),
        }
    }
}

impl FakeFrame {
    /// Load urls in the order they were started.
    pub fn load_urls(&self) -> Vec<String> {
        self.loads.borrow().iter().map(|l| l.request.url.to_string()).collect()
    }

    pub fn fire_media_listeners(&self) {
        let listeners = std::mem::take(&mut *self.media_listeners.borrow_mut());
        for listener in listeners {
            listener();
        }
    }
}

impl FrameClient for FakeFrame {
    fn base_url(&self) -> Url {
        self.base.clone()
    }

    fn can_start_media(&self) -> bool {
        self.can_start_media.get()
    }

    fn add_media_can_start_listener(&self, listener: Box<dyn FnOnce()>) -> ListenerId {
        let mut listeners = self.media_listeners.borrow_mut();
        listeners.push(listener);
        ListenerId(listeners.len() as u64)
    }

    fn navigate(&self, request: &ResourceRequest, target: &str, _user_gesture: bool) {
        self.navigations
            .borrow_mut()
            .push((request.url.to_string(), target.to_string()));
    }

    fn execute_script(&self, script: &str, _user_gesture: bool) -> ScriptValue {
        self.scripts.borrow_mut().push(script.to_string());
        self.script_result.borrow().clone()
    }

    fn start_load(&self, request: &ResourceRequest, client: Weak<dyn LoadClient>) -> Option<Box<dyn LoadHandle>> {
        if self.refuse_loads.get() {
            return None;
        }
        let handle = Rc::new(FakeLoad::default());
        self.loads.borrow_mut().push(StartedLoad {
            request: request.clone(),
            client,
            handle: handle.clone(),
        });
        Some(Box::new(LoadRef(handle)))
    }

    fn cookies(&self, _url: &Url) -> Option<String> {
        self.cookies.borrow().clone()
    }

    fn set_cookies(&self, _url: &Url, value: &str) {
        *self.cookies.borrow_mut() = Some(value.to_string());
    }

    fn invalidate_rect(&self, rect: IntRect) {
        self.invalidations.borrow_mut().push(rect);
    }

    fn set_status_text(&self, text: &str) {
        *self.status_text.borrow_mut() = text.to_string();
    }

    fn create_plugin_window(&self, spec: PluginWindowSpec) -> Option<Box<dyn NativeWindow>> {
        self.window.geometry.set(spec.rect);
        self.window.default_depth.set(spec.default_screen_depth);
        Some(Box::new(FakeWindow(self.window.clone())))
    }

    fn did_fail_to_start_plugin(&self) {
        self.failed_starts.set(self.failed_starts.get() + 1);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub clock: Rc<ManualClock>,
    pub scheduler: Rc<Scheduler>,
    pub frame: Rc<FakeFrame>,
    pub provider: Rc<FakeProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_behavior(PluginBehavior::default())
    }

    pub fn with_behavior(behavior: PluginBehavior) -> Self {
        reset_plugin();
        set_behavior(behavior);
        let clock = Rc::new(ManualClock::new());
        let scheduler = Rc::new(Scheduler::new(clock.clone()));
        Self {
            clock,
            scheduler,
            frame: Rc::new(FakeFrame::default()),
            provider: Rc::new(FakeProvider::default()),
        }
    }

    pub fn module(&self) -> Rc<PluginModule> {
        self.module_at("/plugins/libfake.so")
    }

    /// The fake plugin as installed at `path`, described by the current
    /// behaviour.
    pub fn module_at(&self, path: &str) -> Rc<PluginModule> {
        PluginModule::create(Path::new(path), self.provider.clone(), self.scheduler.clone()).expect("fake module")
    }

    pub fn params(&self, module: &Rc<PluginModule>) -> InstanceParams {
        let mime = module.mime_types()[0].mime_type.clone();
        InstanceParams::new(self.frame.clone(), Some(module.clone()), self.scheduler.clone(), mime)
    }

    /// An initialized instance with no source URL.
    pub fn started_view(&self) -> (Rc<PluginModule>, Rc<PluginView>) {
        let module = self.module();
        let view = PluginView::new(self.params(&module));
        assert!(view.init());
        (module, view)
    }

    /// Run every task that is due now, including ones they post.
    pub fn run(&self) {
        self.scheduler.run_until_idle(64);
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
        self.run();
    }
}
