//! Requests issued by the plugin and the streams that answer them
//!
//! Every request goes through [`PluginView::load`], which validates it and
//! queues it. Queued requests are performed one per scheduler turn, never
//! inside the call that made them.

use std::ffi::CString;
use std::rc::Rc;

use fos_npapi::*;
use url::Url;

use super::{LifecycleState, PluginStatus, PluginView};
use crate::error::{NpError, NpResult};
use crate::host::{LoadClient, ResourceResponse};
use crate::request::{self, NotifyData, PluginRequest, ResourceRequest};
use crate::stream::PluginStream;

impl PluginView {
    /// Resolve a plugin-supplied URL against the document.
    fn complete_url(&self, url: &str) -> NpResult<Url> {
        if url.is_empty() {
            return Err(NpError::InvalidUrl);
        }
        self.frame.base_url().join(url).map_err(|_| NpError::InvalidUrl)
    }

    pub fn get_url(&self, url: &str, target: Option<&str>) -> NpResult {
        self.get_url_notify_inner(url, target, false, NotifyData::null())
    }

    pub fn get_url_notify(&self, url: &str, target: Option<&str>, notify_data: NotifyData) -> NpResult {
        self.get_url_notify_inner(url, target, true, notify_data)
    }

    fn get_url_notify_inner(
        &self,
        url: &str,
        target: Option<&str>,
        send_notification: bool,
        notify_data: NotifyData,
    ) -> NpResult {
        let url = self.complete_url(url)?;
        self.load(PluginRequest {
            target: target.map(str::to_string),
            request: ResourceRequest::get(url),
            send_notification,
            notify_data,
            popups_allowed: self.popup_states.are_popups_allowed(),
        })
    }

    /// POST `buffer`, or the file it names when `file` is set. A leading
    /// header block in the body becomes request headers.
    pub fn post_url(&self, url: &str, target: Option<&str>, buffer: &[u8], file: bool) -> NpResult {
        self.handle_post(url, target, buffer, file, false, NotifyData::null())
    }

    pub fn post_url_notify(
        &self,
        url: &str,
        target: Option<&str>,
        buffer: &[u8],
        file: bool,
        notify_data: NotifyData,
    ) -> NpResult {
        self.handle_post(url, target, buffer, file, true, notify_data)
    }

    fn handle_post(
        &self,
        url: &str,
        target: Option<&str>,
        buffer: &[u8],
        file: bool,
        send_notification: bool,
        notify_data: NotifyData,
    ) -> NpResult {
        if url.is_empty() || buffer.is_empty() {
            return Err(NpError::InvalidParam);
        }

        let contents = if file {
            let spec = String::from_utf8_lossy(buffer);
            request::read_post_file(spec.trim_end_matches('\0'))?
        } else {
            buffer.to_vec()
        };
        let post = request::parse_post_buffer(&contents);

        let url = self.complete_url(url)?;
        let request = ResourceRequest::post(url).with_headers(post.headers).with_body(post.body);
        self.load(PluginRequest {
            target: target.map(str::to_string),
            request,
            send_notification,
            notify_data,
            popups_allowed: self.popup_states.are_popups_allowed(),
        })
    }

    /// Validate and queue a request.
    pub fn load(&self, request: PluginRequest) -> NpResult {
        if request.request.url.as_str().is_empty() {
            return Err(NpError::InvalidUrl);
        }
        if self.frame.is_stopping_loads() {
            return Err(NpError::Generic);
        }

        if request.request.script_source().is_some() {
            if !self.settings.scripting_enabled || !self.frame.can_execute_scripts() {
                return Err(NpError::Generic);
            }
            // Script only runs in the frame holding the plugin.
            if let Some(target) = &request.target {
                if !self.frame.is_own_frame(target) {
                    return Err(NpError::InvalidParam);
                }
            }
        } else if !self.frame.can_display(&request.request.url) {
            return Err(NpError::Generic);
        }

        self.schedule_request(request);
        Ok(())
    }

    fn schedule_request(&self, request: PluginRequest) {
        tracing::debug!("Queued {} {}", request.request.method.as_str(), request.request.url);
        self.requests.borrow_mut().push_back(request);
        if self.request_task.get().is_none() {
            self.arm_request_task();
        }
    }

    fn arm_request_task(&self) {
        let weak = self.weak();
        let task = self.scheduler.post(move || {
            if let Some(view) = weak.upgrade() {
                view.request_task_fired();
            }
        });
        self.request_task.set(Some(task));
    }

    fn request_task_fired(&self) {
        self.request_task.set(None);
        let Some(request) = self.requests.borrow_mut().pop_front() else {
            return;
        };
        // Re-arm first: performing the request may destroy the view.
        if !self.requests.borrow().is_empty() {
            self.arm_request_task();
        }
        self.perform_request(request);
    }

    fn perform_request(&self, request: PluginRequest) {
        if !self.is_started() {
            tracing::debug!("Dropping request for stopped instance: {}", request.request.url);
            return;
        }

        let target = request.target.as_deref().filter(|t| !t.is_empty());
        // A page that is going away only loads into the plugin's own frame.
        if !self.frame.is_document_active() && !target.is_some_and(|t| self.frame.is_own_frame(t)) {
            return;
        }

        let _protect = self.self_ref.upgrade();
        let url = request.request.url.clone();

        let Some(script) = request.request.script_source() else {
            match target {
                None => {
                    let stream = PluginStream::new(self, request.request, request.send_notification, request.notify_data);
                    self.streams.borrow_mut().push(stream.clone());
                    stream.start();
                }
                Some(target) => {
                    self.frame.navigate(&request.request, target, request.popups_allowed);
                    if request.send_notification {
                        self.notify_url(&url, NPRES_DONE, request.notify_data);
                    }
                }
            }
            return;
        };

        let result = self.frame.execute_script(&script, request.popups_allowed);
        if request.target.is_none() && self.is_started() {
            let stream = PluginStream::new(self, request.request, request.send_notification, request.notify_data);
            self.streams.borrow_mut().push(stream.clone());
            stream.send_javascript_stream(&url, result.to_result_string().as_deref());
        }
    }

    fn notify_url(&self, url: &Url, reason: NPReason, notify_data: NotifyData) {
        let url = CString::new(url.as_str()).unwrap_or_default();
        self.with_plugin_call(|funcs, npp| {
            if let Some(urlnotify) = funcs.urlnotify {
                // SAFETY: `url` outlives the call.
                unsafe { urlnotify(npp, url.as_ptr(), reason, notify_data.0) };
            }
        });
    }

    /// A stream finished; forget it.
    pub(crate) fn stream_did_finish(&self, stream: &Rc<PluginStream>) {
        self.disconnect_stream(stream);
    }

    pub(super) fn disconnect_stream(&self, stream: &Rc<PluginStream>) {
        self.streams.borrow_mut().retain(|s| !Rc::ptr_eq(s, stream));
    }

    fn stream_for(&self, np_stream: *mut NPStream) -> Option<Rc<PluginStream>> {
        if np_stream.is_null() {
            return None;
        }
        let streams = self.streams.borrow();
        streams
            .iter()
            .chain(self.manual_stream.borrow().iter())
            .find(|s| s.np_stream() == np_stream)
            .cloned()
    }

    /// The plugin ends one of its streams early.
    pub fn destroy_stream(&self, np_stream: *mut NPStream, reason: NPReason) -> NpResult {
        let stream = self.stream_for(np_stream).ok_or(NpError::InvalidInstance)?;
        stream.cancel_and_destroy(reason);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Manually loaded main document
    // ------------------------------------------------------------------------

    fn manual_stream(&self) -> Option<Rc<PluginStream>> {
        self.manual_stream.borrow().clone()
    }
}

/// The embedder feeds a full-page plugin's document through the view.
impl LoadClient for PluginView {
    fn did_receive_response(&self, response: &ResourceResponse) {
        if self.status.get() != PluginStatus::LoadedSuccessfully || self.state.get() != LifecycleState::Started {
            return;
        }
        if self.manual_stream.borrow().is_some() {
            return;
        }
        let url = response
            .url
            .clone()
            .or_else(|| self.url.clone())
            .unwrap_or_else(|| self.frame.base_url());
        let stream = PluginStream::new_manual(self, ResourceRequest::get(url));
        *self.manual_stream.borrow_mut() = Some(stream.clone());
        stream.did_receive_response(response);
    }

    fn did_receive_data(&self, data: &[u8]) {
        if let Some(stream) = self.manual_stream() {
            stream.did_receive_data(data);
        }
    }

    fn did_finish_loading(&self) {
        if let Some(stream) = self.manual_stream() {
            stream.did_finish_loading();
        }
    }

    fn did_fail(&self) {
        if let Some(stream) = self.manual_stream() {
            stream.did_fail();
        }
    }
}
