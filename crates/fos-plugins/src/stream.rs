//! Plugin streams
//!
//! A [`PluginStream`] connects one network load to one plugin instance. The
//! loader drives it through [`LoadClient`]; it drives the plugin through the
//! stream entries of the plugin table: `newstream`, then `writeready`/`write`
//! pairs, optionally `asfile`, then `destroystream` and `urlnotify`.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::ffi::{CString, c_void};
use std::io::Write;
use std::ptr;
use std::rc::{Rc, Weak};

use fos_npapi::*;
use tempfile::NamedTempFile;
use url::Url;

use crate::host::{FrameClient, LoadClient, LoadHandle, ResourceResponse};
use crate::instance::PluginView;
use crate::quirks::QuirkSet;
use crate::request::{Method, NotifyData, ResourceRequest, percent_decode};
use crate::scheduler::{Scheduler, TaskId};

/// Sentinel for "no reason recorded yet".
const REASON_NONE: NPReason = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    BeforeStarted,
    Started,
    Stopped,
}

/// One network load delivered to a plugin.
pub struct PluginStream {
    self_ref: Weak<PluginStream>,
    view: Weak<PluginView>,
    frame: Rc<dyn FrameClient>,
    scheduler: Rc<Scheduler>,
    request: ResourceRequest,
    quirks: QuirkSet,
    send_notification: bool,
    notify_data: NotifyData,
    load_manually: bool,

    state: Cell<StreamState>,
    np_stream: UnsafeCell<NPStream>,
    new_stream_called: Cell<bool>,
    // Storage behind the NPStream's string pointers.
    url: RefCell<CString>,
    headers: RefCell<Option<CString>>,
    transfer_mode: Cell<u16>,
    delivery_data: RefCell<Vec<u8>>,
    offset: Cell<i32>,
    temp_file: RefCell<Option<NamedTempFile>>,
    reason: Cell<NPReason>,
    load: RefCell<Option<Box<dyn LoadHandle>>>,
    delivery_task: Cell<Option<TaskId>>,
}

impl PluginStream {
    pub(crate) fn new(
        view: &PluginView,
        request: ResourceRequest,
        send_notification: bool,
        notify_data: NotifyData,
    ) -> Rc<Self> {
        Self::build(view, request, send_notification, notify_data, false)
    }

    /// Stream for the document the plugin was instantiated to display. The
    /// embedder feeds it; it has no load of its own.
    pub(crate) fn new_manual(view: &PluginView, request: ResourceRequest) -> Rc<Self> {
        Self::build(view, request, false, NotifyData::null(), true)
    }

    fn build(
        view: &PluginView,
        request: ResourceRequest,
        send_notification: bool,
        notify_data: NotifyData,
        load_manually: bool,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            view: view.weak(),
            frame: view.frame().clone(),
            scheduler: view.scheduler().clone(),
            request,
            quirks: view.quirks(),
            send_notification,
            notify_data,
            load_manually,
            state: Cell::new(StreamState::BeforeStarted),
            np_stream: UnsafeCell::new(NPStream::default()),
            new_stream_called: Cell::new(false),
            url: RefCell::new(CString::default()),
            headers: RefCell::new(None),
            transfer_mode: Cell::new(NP_NORMAL),
            delivery_data: RefCell::new(Vec::new()),
            offset: Cell::new(0),
            temp_file: RefCell::new(None),
            reason: Cell::new(REASON_NONE),
            load: RefCell::new(None),
            delivery_task: Cell::new(None),
        })
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    pub fn request(&self) -> &ResourceRequest {
        &self.request
    }

    pub fn transfer_mode(&self) -> u16 {
        self.transfer_mode.get()
    }

    /// The plugin-visible stream record.
    pub fn np_stream(&self) -> *mut NPStream {
        self.np_stream.get()
    }

    /// Begin the network load.
    pub fn start(&self) {
        debug_assert!(!self.load_manually);
        let client: Weak<dyn LoadClient> = self.self_ref.clone();
        match self.frame.start_load(&self.request, client) {
            Some(handle) => *self.load.borrow_mut() = Some(handle),
            None => {
                tracing::debug!("Load of {} refused", self.request.url);
                let weak = self.self_ref.clone();
                self.scheduler.post(move || {
                    if let Some(stream) = weak.upgrade() {
                        stream.destroy_stream_with_reason(NPRES_NETWORK_ERR);
                    }
                });
            }
        }
    }

    /// Stop without telling the plugin; used when its instance goes away.
    pub fn stop(&self) {
        self.state.set(StreamState::Stopped);
        if let Some(task) = self.delivery_task.take() {
            self.scheduler.cancel(task);
        }

        if self.load_manually {
            self.frame.cancel_main_resource_load();
            return;
        }

        let handle = self.load.borrow_mut().take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    pub fn cancel_and_destroy(&self, reason: NPReason) {
        let _protect = self.self_ref.upgrade();
        self.destroy_stream_with_reason(reason);
        self.stop();
    }

    /// Deliver the result of a `javascript:` request as a `text/plain` stream.
    pub fn send_javascript_stream(&self, request_url: &Url, result: Option<&str>) {
        let length = result.map_or(0, |r| r.len() as u64);
        let response = ResourceResponse {
            url: Some(request_url.clone()),
            mime_type: "text/plain".to_string(),
            expected_content_length: Some(length),
            ..Default::default()
        };
        self.did_receive_response(&response);
        if self.state.get() == StreamState::Stopped {
            return;
        }

        if let Some(result) = result {
            self.did_receive_data(result.as_bytes());
            if self.state.get() == StreamState::Stopped {
                return;
            }
        }

        self.load.borrow_mut().take();
        self.destroy_stream_with_reason(if result.is_some() { NPRES_DONE } else { NPRES_NETWORK_ERR });
    }

    fn set_defers_loading(&self, defers: bool) {
        if let Some(handle) = self.load.borrow().as_ref() {
            handle.set_defers_loading(defers);
        }
    }

    /// Run a plugin entry with loading deferred so the loader cannot re-enter.
    fn call_plugin<R>(&self, f: impl FnOnce(&NPPluginFuncs, NPP) -> R) -> Option<R> {
        let view = self.view.upgrade()?;
        self.set_defers_loading(true);
        let result = view.with_plugin_call(f);
        self.set_defers_loading(false);
        result
    }

    fn start_stream(&self, response: &ResourceResponse) {
        if self.state.get() != StreamState::BeforeStarted {
            return;
        }

        let url = match &response.url {
            // Script URLs go back decoded, the form they were requested in.
            Some(url) if url.scheme() == "javascript" => percent_decode(url.as_str()),
            Some(url) => url.to_string(),
            None => self.request.url.to_string(),
        };
        let is_http = response
            .url
            .as_ref()
            .is_some_and(|u| matches!(u.scheme(), "http" | "https"));
        let mut expected_length = response.expected_content_length;
        let headers = if is_http {
            if response.is_content_encoded() {
                expected_length = None;
            }
            CString::new(response.header_block()).ok()
        } else {
            None
        };
        let mime_type = CString::new(response.mime_type.as_str()).unwrap_or_default();

        *self.url.borrow_mut() = CString::new(url).unwrap_or_default();
        *self.headers.borrow_mut() = headers;

        // SAFETY: no plugin call is in progress on this stream.
        unsafe {
            let stream = &mut *self.np_stream.get();
            stream.url = self.url.borrow().as_ptr();
            stream.headers = self.headers.borrow().as_ref().map_or(ptr::null(), |h| h.as_ptr());
            stream.pdata = ptr::null_mut();
            stream.ndata = self as *const Self as *mut c_void;
            stream.end = expected_length.map_or(0, |len| len.min(u32::MAX as u64) as u32);
            stream.lastmodified = response.last_modified.unwrap_or(0);
            stream.notify_data = self.notify_data.0;
        }
        self.new_stream_called.set(true);
        self.transfer_mode.set(NP_NORMAL);
        self.offset.set(0);
        self.reason.set(REASON_NONE);

        // The plugin may destroy the stream from inside newstream.
        let _protect = self.self_ref.upgrade();
        let np_stream = self.np_stream.get();
        let mut transfer_mode = NP_NORMAL;
        let code = self
            .call_plugin(|funcs, npp| match funcs.newstream {
                // SAFETY: every pointer outlives the call.
                Some(newstream) => unsafe { newstream(npp, mime_type.as_ptr() as NPMIMEType, np_stream, 0, &mut transfer_mode) },
                None => NPERR_GENERIC_ERROR,
            })
            .unwrap_or(NPERR_INVALID_INSTANCE_ERROR);
        self.transfer_mode.set(transfer_mode);

        if self.reason.get() != REASON_NONE {
            return;
        }
        if code != NPERR_NO_ERROR {
            tracing::debug!("Plugin refused stream {}: {}", self.request.url, code);
            self.cancel_and_destroy(code);
            return;
        }

        self.state.set(StreamState::Started);
        if transfer_mode == NP_NORMAL {
            return;
        }

        match tempfile::Builder::new().prefix("fos-plugin-").tempfile() {
            Ok(file) => *self.temp_file.borrow_mut() = Some(file),
            Err(err) => {
                tracing::warn!("Cannot spool stream to disk: {}", err);
                self.cancel_and_destroy(NPRES_NETWORK_ERR);
            }
        }
    }

    /// Hand buffered data to the plugin as fast as it accepts it.
    fn deliver_data(&self) {
        self.delivery_task.set(None);
        if self.state.get() == StreamState::Stopped {
            return;
        }
        if !self.new_stream_called.get() || self.delivery_data.borrow().is_empty() {
            return;
        }

        let np_stream = self.np_stream.get();
        let total = self.delivery_data.borrow().len();
        let mut delivered = 0usize;

        while delivered < total {
            let ready = self
                .call_plugin(|funcs, npp| match funcs.writeready {
                    // SAFETY: the stream record outlives the call.
                    Some(writeready) => unsafe { writeready(npp, np_stream) },
                    None => 0,
                })
                .unwrap_or(0);
            if ready <= 0 {
                self.schedule_delivery();
                break;
            }

            let length = (ready as usize).min(total - delivered);
            // Copy out so the plugin may re-enter while writing.
            let mut chunk = self.delivery_data.borrow()[delivered..delivered + length].to_vec();
            let offset = self.offset.get();
            let written = self
                .call_plugin(|funcs, npp| match funcs.write {
                    // SAFETY: `chunk` holds `length` bytes for the call.
                    Some(write) => unsafe { write(npp, np_stream, offset, length as i32, chunk.as_mut_ptr() as *mut c_void) },
                    None => -1,
                })
                .unwrap_or(-1);

            if written < 0 {
                tracing::debug!("Plugin failed to consume {}", self.request.url);
                self.cancel_and_destroy(NPRES_NETWORK_ERR);
                return;
            }
            if self.state.get() == StreamState::Stopped {
                return;
            }
            if written == 0 {
                self.schedule_delivery();
                break;
            }

            let written = (written as usize).min(length);
            self.offset.set(offset + written as i32);
            delivered += written;
        }

        if delivered > 0 {
            self.delivery_data.borrow_mut().drain(..delivered);
            if self.delivery_data.borrow().is_empty() && self.reason.get() == NPRES_DONE {
                self.destroy_stream();
            }
        }
    }

    fn schedule_delivery(&self) {
        if self.delivery_task.get().is_some() {
            return;
        }
        let weak = self.self_ref.clone();
        let task = self.scheduler.post(move || {
            if let Some(stream) = weak.upgrade() {
                stream.deliver_data();
            }
        });
        self.delivery_task.set(Some(task));
    }

    /// Record why the stream ends, and end it once buffered data is out.
    pub fn destroy_stream_with_reason(&self, reason: NPReason) {
        self.reason.set(reason);
        if reason != NPRES_DONE {
            self.delivery_data.borrow_mut().clear();
        } else if !self.delivery_data.borrow().is_empty() {
            return;
        }
        self.destroy_stream();
    }

    fn destroy_stream(&self) {
        if self.state.get() == StreamState::Stopped {
            return;
        }
        if let Some(task) = self.delivery_task.take() {
            self.scheduler.cancel(task);
        }

        let _protect = self.self_ref.upgrade();
        let reason = self.reason.get();
        let np_stream = self.np_stream.get();
        let new_stream_called = self.new_stream_called.get();

        // Close the spool file before handing its path over.
        let spooled = self.temp_file.borrow_mut().as_mut().map(|f| f.flush());
        if let Some(Err(err)) = spooled {
            tracing::warn!("Failed to flush stream spool: {}", err);
        }

        if new_stream_called {
            let mode = self.transfer_mode.get();
            if reason == NPRES_DONE && (mode == NP_ASFILE || mode == NP_ASFILEONLY) {
                let path = self
                    .temp_file
                    .borrow()
                    .as_ref()
                    .and_then(|f| CString::new(f.path().to_string_lossy().into_owned()).ok());
                if let Some(path) = path {
                    self.call_plugin(|funcs, npp| {
                        if let Some(asfile) = funcs.asfile {
                            // SAFETY: `path` outlives the call.
                            unsafe { asfile(npp, np_stream, path.as_ptr()) };
                        }
                    });
                }
            }

            if self.state.get() != StreamState::BeforeStarted {
                let code = self.call_plugin(|funcs, npp| match funcs.destroystream {
                    // SAFETY: the stream record outlives the call.
                    Some(destroystream) => unsafe { destroystream(npp, np_stream, reason) },
                    None => NPERR_NO_ERROR,
                });
                if let Some(code) = code.filter(|c| *c != NPERR_NO_ERROR) {
                    tracing::debug!("destroystream for {} returned {}", self.request.url, code);
                }
            }
            // SAFETY: no plugin call is in progress on this stream.
            unsafe { (*np_stream).ndata = ptr::null_mut() };
            self.new_stream_called.set(false);
        }

        if self.send_notification {
            let url = CString::new(self.request.url.as_str()).unwrap_or_default();
            let notify_data = self.notify_data.0;
            let flash_post_workaround = !new_stream_called
                && self.quirks.has(QuirkSet::FLASH_URL_NOTIFY_BUG)
                && self.request.method == Method::Post;

            self.call_plugin(|funcs, npp| {
                if flash_post_workaround {
                    // Flash dereferences its stream in urlnotify for POSTs,
                    // so give it an empty one first.
                    let mut synthetic = NPStream {
                        url: c"".as_ptr(),
                        notify_data,
                        ..Default::default()
                    };
                    let mut mode = NP_NORMAL;
                    // SAFETY: `synthetic` outlives both calls.
                    unsafe {
                        if let Some(newstream) = funcs.newstream {
                            newstream(npp, c"".as_ptr() as NPMIMEType, &mut synthetic, 0, &mut mode);
                        }
                        if let Some(destroystream) = funcs.destroystream {
                            destroystream(npp, &mut synthetic, reason);
                        }
                    }
                }
                if let Some(urlnotify) = funcs.urlnotify {
                    // SAFETY: `url` outlives the call.
                    unsafe { urlnotify(npp, url.as_ptr(), reason, notify_data) };
                }
            });
        }

        self.state.set(StreamState::Stopped);
        if !self.load_manually {
            if let (Some(view), Some(this)) = (self.view.upgrade(), self.self_ref.upgrade()) {
                view.stream_did_finish(&this);
            }
        }
        // Deletes the spool file.
        self.temp_file.borrow_mut().take();
    }

    fn spool(&self, data: &[u8]) {
        let result = match self.temp_file.borrow_mut().as_mut() {
            Some(file) => file.write_all(data),
            None => return,
        };
        if let Err(err) = result {
            tracing::warn!("Failed to spool stream data: {}", err);
            self.cancel_and_destroy(NPRES_NETWORK_ERR);
        }
    }
}

impl LoadClient for PluginStream {
    fn did_receive_response(&self, response: &ResourceResponse) {
        self.start_stream(response);
    }

    fn did_receive_data(&self, data: &[u8]) {
        if self.state.get() != StreamState::Started {
            return;
        }
        let _protect = self.self_ref.upgrade();

        if self.transfer_mode.get() != NP_ASFILEONLY {
            self.delivery_data.borrow_mut().extend_from_slice(data);
            self.deliver_data();
        }

        if self.state.get() != StreamState::Stopped {
            self.spool(data);
        }
    }

    fn did_finish_loading(&self) {
        let _protect = self.self_ref.upgrade();
        self.destroy_stream_with_reason(NPRES_DONE);
        self.load.borrow_mut().take();
    }

    fn did_fail(&self) {
        tracing::debug!("Load of {} failed", self.request.url);
        let _protect = self.self_ref.upgrade();
        self.destroy_stream_with_reason(NPRES_NETWORK_ERR);
        self.load.borrow_mut().take();
    }
}

impl Drop for PluginStream {
    fn drop(&mut self) {
        if let Some(task) = self.delivery_task.take() {
            self.scheduler.cancel(task);
        }
    }
}

impl std::fmt::Debug for PluginStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginStream")
            .field("url", &self.request.url.as_str())
            .field("state", &self.state.get())
            .field("transfer_mode", &self.transfer_mode.get())
            .finish()
    }
}
