//! Plugin instances
//!
//! A [`PluginView`] hosts one plugin instance for one embedded-object
//! element. It owns the instance handle the plugin sees, a load reference on
//! the module, the drawing surface, queued requests and open streams.
//!
//! Plugin code may call back into the host before any call into it returns,
//! and may tear the view down from inside such a callback. All state is kept
//! in cells so no borrow is ever held across a plugin call, and every call
//! keeps the view alive until it returns.

mod display;
mod input;
mod loading;
mod services;

use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::{HashMap, VecDeque};
use std::ffi::{CString, c_char, c_void};
use std::ptr;
use std::rc::{Rc, Weak};

use fos_npapi::*;
use tiny_skia::Pixmap;
use url::Url;

use crate::config::PluginSettings;
use crate::context::{self, PluginCallScope, ScriptLock};
use crate::error::{NpError, NpResult};
use crate::geometry::IntRect;
use crate::host::{DisplayState, FrameClient, ListenerId, PluginWindowSpec};
use crate::module::PluginModule;
use crate::popup::PopupStateStack;
use crate::quirks::QuirkSet;
use crate::request::PluginRequest;
use crate::scheduler::{Scheduler, TaskId};
use crate::stream::PluginStream;
use crate::surface::{NativeSurface, WindowlessBuffer};
use crate::throttler::MessageThrottler;

pub(crate) use services::get_static_value;
use services::Timer;

/// Where an instance is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    /// Waiting for the host to allow media to start
    WaitingToStart,
    Started,
    Stopped,
    /// Native resources released; a snapshot stands in until restarted
    Halted,
}

/// Outcome of initialization, as the element shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    CannotFindPlugin,
    CannotLoad,
    LoadedSuccessfully,
}

/// Everything needed to create a [`PluginView`].
pub struct InstanceParams {
    pub frame: Rc<dyn FrameClient>,
    /// `None` when no installed plugin handles the MIME type
    pub module: Option<Rc<PluginModule>>,
    pub scheduler: Rc<Scheduler>,
    pub settings: PluginSettings,
    pub script_lock: Rc<dyn ScriptLock>,
    pub mime_type: String,
    /// Source of the element, loaded once the instance starts
    pub url: Option<Url>,
    /// Element attributes and `<param>` children, in document order
    pub params: Vec<(String, String)>,
    /// The embedder feeds the main document to the plugin itself
    pub load_manually: bool,
}

impl InstanceParams {
    pub fn new(
        frame: Rc<dyn FrameClient>,
        module: Option<Rc<PluginModule>>,
        scheduler: Rc<Scheduler>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            frame,
            module,
            scheduler,
            settings: PluginSettings::default(),
            script_lock: Rc::new(context::NoScriptLock),
            mime_type: mime_type.into(),
            url: None,
            params: Vec::new(),
            load_manually: false,
        }
    }
}

/// Host side of one plugin instance.
pub struct PluginView {
    self_ref: Weak<PluginView>,
    frame: Rc<dyn FrameClient>,
    module: Option<Rc<PluginModule>>,
    scheduler: Rc<Scheduler>,
    settings: PluginSettings,
    script_lock: Rc<dyn ScriptLock>,
    quirks: QuirkSet,
    mime_type: CString,
    url: Option<Url>,
    param_names: Vec<CString>,
    param_values: Vec<CString>,
    plugins_page: Option<String>,
    mode: u16,
    load_manually: bool,

    npp: UnsafeCell<NPP_t>,
    np_window: UnsafeCell<NPWindow>,
    plugin_funcs: Cell<Option<NPPluginFuncs>>,
    module_loaded: Cell<bool>,
    init_done: Cell<bool>,
    detached: Cell<bool>,
    state: Cell<LifecycleState>,
    status: Cell<PluginStatus>,
    start_listener: Cell<Option<ListenerId>>,

    // Surface and geometry
    is_windowed: Cell<bool>,
    is_transparent: Cell<bool>,
    surface: RefCell<Option<NativeSurface>>,
    frame_rect: Cell<IntRect>,
    window_rect: Cell<IntRect>,
    clip_rect: Cell<IntRect>,
    has_pending_geometry_change: Cell<bool>,
    sent_empty_clip: Cell<bool>,
    set_window_called: Cell<bool>,
    snapshot: RefCell<Option<Pixmap>>,

    // Input
    has_focus: Cell<bool>,
    popup_states: PopupStateStack,
    current_native_message: Cell<Option<u32>>,
    throttler: RefCell<Option<Rc<MessageThrottler>>>,

    // Loading
    requests: RefCell<VecDeque<PluginRequest>>,
    request_task: Cell<Option<TaskId>>,
    streams: RefCell<Vec<Rc<PluginStream>>>,
    manual_stream: RefCell<Option<Rc<PluginStream>>>,

    // Services
    timers: RefCell<HashMap<u32, Timer>>,
    next_timer_id: Cell<u32>,
    async_calls: RefCell<Vec<TaskId>>,
    pending_invalidations: RefCell<Vec<IntRect>>,
    invalidate_task: Cell<Option<TaskId>>,
    user_agent: RefCell<Option<CString>>,
}

impl PluginView {
    pub fn new(params: InstanceParams) -> Rc<Self> {
        let quirks = params.module.as_ref().map_or(QuirkSet::NONE, |m| m.quirks());
        let mime_type = CString::new(params.mime_type).unwrap_or_default();

        let mut param_names = Vec::with_capacity(params.params.len());
        let mut param_values = Vec::with_capacity(params.params.len());
        let mut plugins_page = None;
        for (name, value) in params.params {
            if quirks.has(QuirkSet::REMOVE_WINDOWLESS_VIDEO_PARAM) && name.eq_ignore_ascii_case("windowlessvideo") {
                continue;
            }
            if name == "pluginspage" {
                plugins_page = Some(value.clone());
            }
            // Interior NULs cannot cross the boundary; such params are dropped.
            if let (Ok(name), Ok(value)) = (CString::new(name), CString::new(value)) {
                param_names.push(name);
                param_values.push(value);
            }
        }

        let view = Rc::new_cyclic(|weak: &Weak<PluginView>| Self {
            self_ref: weak.clone(),
            frame: params.frame,
            module: params.module,
            scheduler: params.scheduler,
            settings: params.settings,
            script_lock: params.script_lock,
            quirks,
            mime_type,
            url: params.url,
            param_names,
            param_values,
            plugins_page,
            mode: if params.load_manually { NP_FULL } else { NP_EMBED },
            load_manually: params.load_manually,
            npp: UnsafeCell::new(NPP_t::default()),
            np_window: UnsafeCell::new(NPWindow::default()),
            plugin_funcs: Cell::new(None),
            module_loaded: Cell::new(false),
            init_done: Cell::new(false),
            detached: Cell::new(false),
            state: Cell::new(LifecycleState::Uninitialized),
            status: Cell::new(PluginStatus::CannotFindPlugin),
            start_listener: Cell::new(None),
            is_windowed: Cell::new(true),
            is_transparent: Cell::new(false),
            surface: RefCell::new(None),
            frame_rect: Cell::new(IntRect::default()),
            window_rect: Cell::new(IntRect::default()),
            clip_rect: Cell::new(IntRect::default()),
            has_pending_geometry_change: Cell::new(true),
            sent_empty_clip: Cell::new(false),
            set_window_called: Cell::new(false),
            snapshot: RefCell::new(None),
            has_focus: Cell::new(false),
            popup_states: PopupStateStack::new(),
            current_native_message: Cell::new(None),
            throttler: RefCell::new(None),
            requests: RefCell::new(VecDeque::new()),
            request_task: Cell::new(None),
            streams: RefCell::new(Vec::new()),
            manual_stream: RefCell::new(None),
            timers: RefCell::new(HashMap::new()),
            next_timer_id: Cell::new(1),
            async_calls: RefCell::new(Vec::new()),
            pending_invalidations: RefCell::new(Vec::new()),
            invalidate_task: Cell::new(None),
            user_agent: RefCell::new(None),
        });

        // SAFETY: the view is not shared yet.
        unsafe { (*view.npp.get()).ndata = Rc::as_ptr(&view) as *mut c_void };
        context::register_instance(view.npp(), Rc::downgrade(&view));
        view
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Instance handle given to the plugin.
    pub fn npp(&self) -> NPP {
        self.npp.get()
    }

    pub(crate) fn weak(&self) -> Weak<PluginView> {
        self.self_ref.clone()
    }

    pub fn frame(&self) -> &Rc<dyn FrameClient> {
        &self.frame
    }

    pub fn module(&self) -> Option<&Rc<PluginModule>> {
        self.module.as_ref()
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    pub fn quirks(&self) -> QuirkSet {
        self.quirks
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type.to_str().unwrap_or_default()
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Parameter names as handed to the plugin.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.param_names.iter().filter_map(|n| n.to_str().ok())
    }

    pub fn plugins_page(&self) -> Option<&str> {
        self.plugins_page.as_deref()
    }

    /// `NP_EMBED`, or `NP_FULL` for a plugin displaying a whole document.
    pub fn mode(&self) -> u16 {
        self.mode
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn status(&self) -> PluginStatus {
        self.status.get()
    }

    pub fn is_started(&self) -> bool {
        self.state.get() == LifecycleState::Started
    }

    pub fn is_halted(&self) -> bool {
        self.state.get() == LifecycleState::Halted
    }

    pub fn is_windowed(&self) -> bool {
        self.is_windowed.get()
    }

    pub fn is_transparent(&self) -> bool {
        self.is_transparent.get()
    }

    pub fn open_stream_count(&self) -> usize {
        self.streams.borrow().len()
    }

    pub fn queued_request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn popup_states(&self) -> &PopupStateStack {
        &self.popup_states
    }

    /// Plugin table version, minor part.
    fn plugin_minor_version(&self) -> u16 {
        self.plugin_funcs.get().map_or(0, |f| f.minor_version())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Load the module and start the instance, or queue the start until media
    /// may play. Runs once; later calls report the first outcome.
    pub fn init(&self) -> bool {
        if self.init_done.replace(true) {
            return self.status.get() == PluginStatus::LoadedSuccessfully;
        }

        if !self.settings.enabled {
            tracing::debug!("Plugins disabled, not loading {}", self.mime_type());
            self.status.set(PluginStatus::CannotLoad);
            return false;
        }

        let Some(module) = self.module.clone() else {
            tracing::debug!("No plugin for {}", self.mime_type());
            self.status.set(PluginStatus::CannotFindPlugin);
            return false;
        };

        if let Err(err) = module.load() {
            tracing::warn!("Cannot load plugin {}: {}", module.name(), err);
            self.status.set(PluginStatus::CannotLoad);
            self.frame.did_fail_to_start_plugin();
            return false;
        }
        self.module_loaded.set(true);
        self.plugin_funcs.set(module.plugin_funcs());

        if !self.start_or_add_to_unstarted_list() {
            self.status.set(PluginStatus::CannotLoad);
            return false;
        }

        self.status.set(PluginStatus::LoadedSuccessfully);
        true
    }

    /// Start now, or once the host allows media to start.
    pub fn start_or_add_to_unstarted_list(&self) -> bool {
        if !self.load_manually && !self.frame.can_start_media() {
            if self.start_listener.get().is_none() {
                let weak = self.self_ref.clone();
                let id = self.frame.add_media_can_start_listener(Box::new(move || {
                    if let Some(view) = weak.upgrade() {
                        view.media_can_start();
                    }
                }));
                self.start_listener.set(Some(id));
            }
            self.state.set(LifecycleState::WaitingToStart);
            tracing::debug!("Deferring start of {} until media can start", self.mime_type());
            return true;
        }
        self.start()
    }

    /// Listener callback for a deferred start.
    pub fn media_can_start(&self) {
        self.start_listener.set(None);
        if self.state.get() != LifecycleState::WaitingToStart {
            return;
        }
        if !self.start() {
            self.status.set(PluginStatus::CannotLoad);
            self.frame.did_fail_to_start_plugin();
        }
    }

    /// Create the plugin instance. Calling it on a started instance does
    /// nothing.
    pub fn start(&self) -> bool {
        match self.state.get() {
            LifecycleState::Started => return true,
            LifecycleState::Stopped if self.detached.get() => return false,
            _ => {}
        }
        let Some(funcs) = self.plugin_funcs.get() else {
            return false;
        };
        let Some(newp) = funcs.newp else {
            tracing::warn!("Plugin for {} has no newp entry", self.mime_type());
            return false;
        };

        let mut argn: Vec<*mut c_char> = self.param_names.iter().map(|n| n.as_ptr() as *mut c_char).collect();
        let mut argv: Vec<*mut c_char> = self.param_values.iter().map(|v| v.as_ptr() as *mut c_char).collect();
        let argc = argn.len().min(i16::MAX as usize) as i16;
        let mime = self.mime_type.as_ptr() as NPMIMEType;
        let mode = self.mode;

        // Windowed unless the plugin says otherwise during newp.
        self.is_windowed.set(true);
        let code = self
            .with_plugin_call(|_, npp| {
                // SAFETY: the name/value arrays and the MIME string outlive the call.
                unsafe { newp(mime, npp, mode, argc, argn.as_mut_ptr(), argv.as_mut_ptr(), ptr::null_mut()) }
            })
            .unwrap_or(NPERR_INVALID_INSTANCE_ERROR);

        if let Err(err) = NpError::from_code(code) {
            tracing::warn!("Plugin refused instance for {}: {}", self.mime_type(), err);
            self.status.set(PluginStatus::CannotLoad);
            return false;
        }

        self.state.set(LifecycleState::Started);
        tracing::debug!(
            "Started {} instance ({})",
            self.mime_type(),
            if self.is_windowed.get() { "windowed" } else { "windowless" }
        );

        self.create_surface();
        if !self.quirks.has(QuirkSet::DEFER_FIRST_SET_WINDOW_CALL) {
            self.set_np_window_if_needed();
        }

        if let Some(url) = self.url.clone().filter(|_| !self.load_manually) {
            let request = PluginRequest {
                target: None,
                request: crate::request::ResourceRequest::get(url),
                send_notification: false,
                notify_data: crate::request::NotifyData::null(),
                popups_allowed: self.popup_states.are_popups_allowed(),
            };
            if let Err(err) = self.load(request) {
                tracing::debug!("Initial load for {} refused: {}", self.mime_type(), err);
            }
        }
        true
    }

    /// Destroy the plugin instance, closing its streams first.
    pub fn stop(&self) {
        if self.state.get() != LifecycleState::Started {
            if self.state.get() == LifecycleState::WaitingToStart {
                self.state.set(LifecycleState::Stopped);
            }
            return;
        }
        let _protect = self.self_ref.upgrade();

        let streams: Vec<Rc<PluginStream>> = self.streams.borrow().clone();
        for stream in &streams {
            stream.stop();
            self.disconnect_stream(stream);
        }
        debug_assert!(self.streams.borrow().is_empty());
        let manual = self.manual_stream.borrow_mut().take();
        if let Some(stream) = manual {
            stream.stop();
        }

        self.state.set(LifecycleState::Stopped);
        self.cancel_services();
        if let Some(throttler) = self.throttler.borrow_mut().take() {
            throttler.clear();
        }

        // SAFETY: no plugin call is in progress that reads the window record.
        unsafe { (*self.np_window.get()).window = ptr::null_mut() };
        let np_window = self.np_window.get();
        if !self.quirks.has(QuirkSet::DONT_SET_NULL_WINDOW_HANDLE_ON_DESTROY) {
            self.with_plugin_call(|funcs, npp| {
                if let Some(setwindow) = funcs.setwindow {
                    // SAFETY: the window record lives as long as the view.
                    unsafe { setwindow(npp, np_window) };
                }
            });
        }

        let mut saved: *mut NPSavedData = ptr::null_mut();
        let code = self.with_plugin_call(|funcs, npp| match funcs.destroy {
            // SAFETY: `saved` outlives the call.
            Some(destroy) => unsafe { destroy(npp, &mut saved) },
            None => NPERR_NO_ERROR,
        });
        if let Some(code) = code.filter(|c| *c != NPERR_NO_ERROR) {
            tracing::debug!("destroy for {} returned {}", self.mime_type(), code);
        }
        // Saved data is not restored into later instances.
        if !saved.is_null() {
            // SAFETY: the plugin allocated both with the host allocator.
            unsafe {
                crate::scripting::mem_free((*saved).buf);
                crate::scripting::mem_free(saved as *mut c_void);
            }
        }

        // SAFETY: the instance is gone; nothing reads pdata any more.
        unsafe { (*self.npp.get()).pdata = ptr::null_mut() };
        self.has_focus.set(false);
        self.set_window_called.set(false);
        self.sent_empty_clip.set(false);
        self.has_pending_geometry_change.set(true);
        tracing::debug!("Stopped {} instance", self.mime_type());
    }

    /// Release native resources but keep the element alive behind a
    /// snapshot. A click or [`Self::restart`] brings it back.
    pub fn halt(&self) -> bool {
        if self.state.get() != LifecycleState::Started {
            return false;
        }
        let snapshot = self.surface.borrow().as_ref().and_then(NativeSurface::snapshot);
        *self.snapshot.borrow_mut() = snapshot;

        self.stop();
        self.destroy_surface();
        self.state.set(LifecycleState::Halted);
        self.frame.display_state_changed(DisplayState::DisplayingSnapshot);
        tracing::debug!("Halted {} instance", self.mime_type());
        true
    }

    pub fn restart(&self) -> bool {
        if self.state.get() != LifecycleState::Halted {
            return false;
        }
        self.state.set(LifecycleState::Stopped);
        self.snapshot.borrow_mut().take();
        if !self.start() {
            return false;
        }
        self.frame.display_state_changed(DisplayState::Playing);
        self.frame.invalidate_rect(self.frame_rect.get());
        true
    }

    /// Tear down for good: the element left the document.
    pub fn detach(&self) {
        if self.detached.replace(true) {
            return;
        }
        if let Some(id) = self.start_listener.take() {
            self.frame.remove_media_can_start_listener(id);
        }
        if let Some(task) = self.request_task.take() {
            self.scheduler.cancel(task);
        }
        self.requests.borrow_mut().clear();

        self.stop();
        self.destroy_surface();
        self.popup_states.clear();
        context::unregister_instance(self.npp());

        if self.module_loaded.replace(false) {
            if let Some(module) = &self.module {
                if !self.quirks.has(QuirkSet::DONT_UNLOAD_PLUGIN) {
                    module.unload();
                }
            }
        }
        self.plugin_funcs.set(None);
    }

    fn create_surface(&self) {
        let surface = if self.is_windowed.get() {
            let spec = PluginWindowSpec {
                rect: self.window_rect.get(),
                default_screen_depth: self.quirks.has(QuirkSet::REQUIRES_DEFAULT_SCREEN_DEPTH),
            };
            match self.frame.create_plugin_window(spec) {
                Some(window) => {
                    window.set_visible(!self.clip_rect.get().is_empty());
                    Some(NativeSurface::Windowed(Rc::from(window)))
                }
                None => {
                    tracing::warn!("No native window for windowed plugin {}", self.mime_type());
                    None
                }
            }
        } else {
            let rect = self.frame_rect.get();
            Some(NativeSurface::Windowless(WindowlessBuffer::new(
                rect.width.max(0) as u32,
                rect.height.max(0) as u32,
            )))
        };
        *self.surface.borrow_mut() = surface;
    }

    fn destroy_surface(&self) {
        let surface = self.surface.borrow_mut().take();
        if let Some(surface) = surface {
            surface.set_visible(false);
        }
    }

    // ------------------------------------------------------------------------
    // Plugin calls
    // ------------------------------------------------------------------------

    /// Call into the plugin with the call context set up.
    ///
    /// Returns `None` when the instance has no plugin table.
    pub(crate) fn with_plugin_call<R>(&self, f: impl FnOnce(&NPPluginFuncs, NPP) -> R) -> Option<R> {
        let funcs = self.plugin_funcs.get()?;
        let _protect = self.self_ref.upgrade();
        let _scope = PluginCallScope::enter(
            self.self_ref.clone(),
            self.script_lock.as_ref(),
            self.quirks.has(QuirkSet::HAS_MODAL_MESSAGE_LOOP),
        );
        Some(f(&funcs, self.npp()))
    }

    /// Ask the plugin for its scripting object. The caller owns a reference.
    pub fn scriptable_object(&self) -> *mut NPObject {
        if !self.is_started() {
            return ptr::null_mut();
        }
        let mut object: *mut NPObject = ptr::null_mut();
        let code = self.with_plugin_call(|funcs, npp| match funcs.getvalue {
            // SAFETY: the variable writes an object pointer through `object`.
            Some(getvalue) => unsafe {
                getvalue(npp, NPPV_PLUGIN_SCRIPTABLE_NPOBJECT, &mut object as *mut *mut NPObject as *mut c_void)
            },
            None => NPERR_GENERIC_ERROR,
        });
        if code != Some(NPERR_NO_ERROR) {
            return ptr::null_mut();
        }
        object
    }

    pub(crate) fn ensure_started(&self) -> NpResult {
        if self.is_started() { Ok(()) } else { Err(NpError::InvalidInstance) }
    }
}

impl Drop for PluginView {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for PluginView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginView")
            .field("mime_type", &self.mime_type())
            .field("state", &self.state.get())
            .field("status", &self.status.get())
            .field("windowed", &self.is_windowed.get())
            .field("streams", &self.streams.borrow().len())
            .finish()
    }
}
