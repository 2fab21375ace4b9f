//! Embedder interfaces
//!
//! The plugin host does not own a document, a loader or a script engine. The
//! embedder supplies them through these traits.

use std::ffi::c_void;
use std::ptr;
use std::rc::Weak;

use fos_npapi::NPObject;
use tiny_skia::Pixmap;
use url::Url;

use crate::geometry::IntRect;
use crate::request::ResourceRequest;

/// Result of evaluating script on behalf of a plugin.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Void,
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
}

impl ScriptValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Body of a `javascript:` stream. Void and null results have none.
    pub fn to_result_string(&self) -> Option<String> {
        match self {
            ScriptValue::Void | ScriptValue::Null => None,
            ScriptValue::Bool(b) => Some(b.to_string()),
            ScriptValue::Int(i) => Some(i.to_string()),
            ScriptValue::Double(d) => Some(d.to_string()),
            ScriptValue::String(s) => Some(s.clone()),
        }
    }
}

/// What the embedder should show for the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    /// Plugin is live
    Playing,
    /// Plugin was halted; a snapshot is shown and a click restarts it
    DisplayingSnapshot,
}

/// Child window wanted by a windowed plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginWindowSpec {
    /// Element rect in native window coordinates
    pub rect: IntRect,
    /// Create with the screen's default depth and visual, not the parent's
    pub default_screen_depth: bool,
}

/// Registration of a one-shot "media can start" listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Response metadata for a network load.
#[derive(Debug, Clone, Default)]
pub struct ResourceResponse {
    pub url: Option<Url>,
    pub mime_type: String,
    pub expected_content_length: Option<u64>,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    /// Seconds since the epoch
    pub last_modified: Option<u32>,
}

impl ResourceResponse {
    pub fn new(url: Url, mime_type: impl Into<String>) -> Self {
        Self {
            url: Some(url),
            mime_type: mime_type.into(),
            status: 200,
            status_text: "OK".to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.expected_content_length = Some(length);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body arrives transformed, so the expected length is not the real one.
    pub fn is_content_encoded(&self) -> bool {
        self.header("Content-Encoding")
            .is_some_and(|enc| !enc.trim().eq_ignore_ascii_case("identity"))
    }

    /// Header block in the form plugins expect: status line, then one
    /// `name: value` line per header.
    pub fn header_block(&self) -> String {
        let mut block = format!("HTTP/1.1 {} {}\n", self.status, self.status_text);
        for (name, value) in &self.headers {
            block.push_str(name);
            block.push_str(": ");
            block.push_str(value);
            block.push('\n');
        }
        block
    }
}

/// Receiving side of a network load.
pub trait LoadClient {
    fn did_receive_response(&self, response: &ResourceResponse);

    fn did_receive_data(&self, data: &[u8]);

    fn did_finish_loading(&self);

    fn did_fail(&self);
}

/// An in-flight load started by the embedder.
pub trait LoadHandle {
    /// Stop the load without further client callbacks.
    fn cancel(&self);

    /// Pause or resume delivery to the client.
    fn set_defers_loading(&self, defers: bool);
}

/// A native child window owned by a windowed plugin.
pub trait NativeWindow {
    /// Platform handle handed to the plugin.
    fn handle(&self) -> *mut c_void;

    fn set_geometry(&self, rect: IntRect);

    fn set_clip(&self, _clip: IntRect) {}

    fn set_visible(&self, visible: bool);

    fn is_visible(&self) -> bool;

    /// Capture the window contents, for halting.
    fn snapshot(&self) -> Option<Pixmap> {
        None
    }

    /// Deliver a native message to the plugin's window procedure.
    fn dispatch_message(&self, message: u32, wparam: usize, lparam: isize) -> bool;
}

/// The document, frame and loader the plugin element lives in.
pub trait FrameClient {
    /// Base for resolving relative plugin URLs.
    fn base_url(&self) -> Url;

    /// Security-origin check for non-script URLs.
    fn can_display(&self, _url: &Url) -> bool {
        true
    }

    /// The document loader is cancelling every load.
    fn is_stopping_loads(&self) -> bool {
        false
    }

    /// The frame still shows the document the plugin belongs to.
    fn is_document_active(&self) -> bool {
        true
    }

    fn can_start_media(&self) -> bool {
        true
    }

    /// Call `listener` once media may start.
    fn add_media_can_start_listener(&self, listener: Box<dyn FnOnce()>) -> ListenerId;

    fn remove_media_can_start_listener(&self, _id: ListenerId) {}

    fn can_execute_scripts(&self) -> bool {
        true
    }

    /// Whether `target` names the frame containing the plugin.
    fn is_own_frame(&self, target: &str) -> bool {
        target.is_empty() || target.eq_ignore_ascii_case("_self") || target.eq_ignore_ascii_case("_current")
    }

    /// Load `request` into the frame named `target`.
    fn navigate(&self, request: &ResourceRequest, target: &str, user_gesture: bool);

    fn execute_script(&self, _script: &str, _user_gesture: bool) -> ScriptValue {
        ScriptValue::Void
    }

    /// Start a network load feeding `client`. `None` if it could not start.
    fn start_load(&self, request: &ResourceRequest, client: Weak<dyn LoadClient>) -> Option<Box<dyn LoadHandle>>;

    /// Cancel the main resource load the plugin was being fed manually.
    fn cancel_main_resource_load(&self) {}

    fn cookies(&self, _url: &Url) -> Option<String> {
        None
    }

    fn set_cookies(&self, _url: &Url, _value: &str) {}

    /// Repaint part of the document.
    fn invalidate_rect(&self, _rect: IntRect) {}

    fn set_status_text(&self, _text: &str) {}

    fn display_state_changed(&self, _state: DisplayState) {}

    /// Retained script object for the window, or null.
    fn window_script_object(&self) -> *mut NPObject {
        ptr::null_mut()
    }

    /// Retained script object for the plugin element, or null.
    fn plugin_element_object(&self) -> *mut NPObject {
        ptr::null_mut()
    }

    fn parent_window_handle(&self) -> *mut c_void {
        ptr::null_mut()
    }

    /// Create a child window for a windowed plugin.
    fn create_plugin_window(&self, _spec: PluginWindowSpec) -> Option<Box<dyn NativeWindow>> {
        None
    }

    fn is_private_browsing(&self) -> bool {
        false
    }

    /// A deferred start failed.
    fn did_fail_to_start_plugin(&self) {}

    /// Overrides the configured user agent.
    fn user_agent(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_block() {
        let url = Url::parse("http://example.com/movie.swf").unwrap();
        let response = ResourceResponse::new(url, "application/x-shockwave-flash")
            .with_header("Content-Type", "application/x-shockwave-flash")
            .with_header("Content-Length", "42");
        assert_eq!(
            response.header_block(),
            "HTTP/1.1 200 OK\nContent-Type: application/x-shockwave-flash\nContent-Length: 42\n"
        );
        assert_eq!(response.header("content-length"), Some("42"));
    }

    #[test]
    fn test_content_encoding() {
        let url = Url::parse("http://example.com/").unwrap();
        let plain = ResourceResponse::new(url.clone(), "text/plain");
        assert!(!plain.is_content_encoded());
        assert!(plain.clone().with_header("Content-Encoding", "gzip").is_content_encoded());
        assert!(!plain.with_header("Content-Encoding", "identity").is_content_encoded());
    }
}
