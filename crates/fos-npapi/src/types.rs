//! Core ABI Types
//!
//! Instance handles, streams, windows and the result/reason codes.

use std::ffi::{c_char, c_void};
use std::ptr;

/// Result code returned by most host and plugin calls.
pub type NPError = i16;
/// Why a stream ended.
pub type NPReason = i16;
/// One-byte boolean used by the older calls.
pub type NPBool = u8;
/// MIME type as a NUL-terminated string.
pub type NPMIMEType = *mut c_char;
/// Opaque region handle for `invalidateregion`.
pub type NPRegion = *mut c_void;

pub const NP_VERSION_MAJOR: u16 = 0;
pub const NP_VERSION_MINOR: u16 = 27;

// Minor versions at which features appeared
pub const NPVERS_HAS_STREAMOUTPUT: u16 = 8;
pub const NPVERS_HAS_NOTIFICATION: u16 = 9;
pub const NPVERS_HAS_WINDOWLESS: u16 = 11;
pub const NPVERS_HAS_NPRUNTIME_SCRIPTING: u16 = 14;
pub const NPVERS_HAS_FORM_VALUES: u16 = 15;
pub const NPVERS_HAS_POPUPS_ENABLED_STATE: u16 = 16;
pub const NPVERS_HAS_RESPONSE_HEADERS: u16 = 17;
pub const NPVERS_HAS_NPOBJECT_ENUM: u16 = 18;
pub const NPVERS_HAS_PLUGIN_THREAD_ASYNC_CALL: u16 = 19;
pub const NPVERS_HAS_ALL_NETWORK_STREAMS: u16 = 20;
pub const NPVERS_HAS_URL_AND_AUTH_INFO: u16 = 21;
pub const NPVERS_HAS_PRIVATE_MODE: u16 = 22;
pub const NPVERS_HAS_ADVANCED_KEY_HANDLING: u16 = 25;
pub const NPVERS_HAS_URL_REDIRECT_HANDLING: u16 = 26;
pub const NPVERS_HAS_CLEAR_SITE_DATA: u16 = 27;

/// Packed `major << 8 | minor` the host advertises.
pub const NP_HOST_VERSION: u16 = (NP_VERSION_MAJOR << 8) | NP_VERSION_MINOR;

pub const NPERR_NO_ERROR: NPError = 0;
pub const NPERR_GENERIC_ERROR: NPError = 1;
pub const NPERR_INVALID_INSTANCE_ERROR: NPError = 2;
pub const NPERR_INVALID_FUNCTABLE_ERROR: NPError = 3;
pub const NPERR_MODULE_LOAD_FAILED_ERROR: NPError = 4;
pub const NPERR_OUT_OF_MEMORY_ERROR: NPError = 5;
pub const NPERR_INVALID_PLUGIN_ERROR: NPError = 6;
pub const NPERR_INVALID_PLUGIN_DIR_ERROR: NPError = 7;
pub const NPERR_INCOMPATIBLE_VERSION_ERROR: NPError = 8;
pub const NPERR_INVALID_PARAM: NPError = 9;
pub const NPERR_INVALID_URL: NPError = 10;
pub const NPERR_FILE_NOT_FOUND: NPError = 11;
pub const NPERR_NO_DATA: NPError = 12;
pub const NPERR_STREAM_NOT_SEEKABLE: NPError = 13;

pub const NPRES_DONE: NPReason = 0;
pub const NPRES_NETWORK_ERR: NPReason = 1;
pub const NPRES_USER_BREAK: NPReason = 2;

// Instance modes
pub const NP_EMBED: u16 = 1;
pub const NP_FULL: u16 = 2;

// Stream transfer modes
pub const NP_NORMAL: u16 = 1;
pub const NP_SEEK: u16 = 2;
pub const NP_ASFILE: u16 = 3;
pub const NP_ASFILEONLY: u16 = 4;

/// Window kind carried by [`NPWindow`].
pub type NPWindowType = u32;
pub const NP_WINDOW_TYPE_WINDOW: NPWindowType = 1;
pub const NP_WINDOW_TYPE_DRAWABLE: NPWindowType = 2;

/// Host variables a plugin can query with `getvalue`.
pub type NPNVariable = i32;
pub const NPNV_X_DISPLAY: NPNVariable = 1;
pub const NPNV_XT_APP_CONTEXT: NPNVariable = 2;
pub const NPNV_NETSCAPE_WINDOW: NPNVariable = 3;
pub const NPNV_JAVASCRIPT_ENABLED_BOOL: NPNVariable = 4;
pub const NPNV_ASD_ENABLED_BOOL: NPNVariable = 5;
pub const NPNV_IS_OFFLINE_BOOL: NPNVariable = 6;
pub const NPNV_TOOLKIT: NPNVariable = 13;
pub const NPNV_SUPPORTS_XEMBED_BOOL: NPNVariable = 14;
pub const NPNV_WINDOW_NPOBJECT: NPNVariable = 15;
pub const NPNV_PLUGIN_ELEMENT_NPOBJECT: NPNVariable = 16;
pub const NPNV_SUPPORTS_WINDOWLESS: NPNVariable = 17;
pub const NPNV_PRIVATE_MODE_BOOL: NPNVariable = 18;

/// Plugin variables, queried with the plugin's `getvalue` or set by the
/// plugin through the host's `setvalue`.
pub type NPPVariable = i32;
pub const NPPV_PLUGIN_NAME_STRING: NPPVariable = 1;
pub const NPPV_PLUGIN_DESCRIPTION_STRING: NPPVariable = 2;
pub const NPPV_PLUGIN_WINDOW_BOOL: NPPVariable = 3;
pub const NPPV_PLUGIN_TRANSPARENT_BOOL: NPPVariable = 4;
pub const NPPV_JAVA_CLASS: NPPVariable = 5;
pub const NPPV_PLUGIN_WINDOW_SIZE: NPPVariable = 6;
pub const NPPV_PLUGIN_TIMER_INTERVAL: NPPVariable = 7;
pub const NPPV_PLUGIN_SCRIPTABLE_INSTANCE: NPPVariable = 10;
pub const NPPV_PLUGIN_SCRIPTABLE_IID: NPPVariable = 11;
pub const NPPV_JAVASCRIPT_PUSH_CALLER_BOOL: NPPVariable = 12;
pub const NPPV_PLUGIN_KEEP_LIBRARY_IN_MEMORY: NPPVariable = 13;
pub const NPPV_PLUGIN_NEEDS_XEMBED: NPPVariable = 14;
pub const NPPV_PLUGIN_SCRIPTABLE_NPOBJECT: NPPVariable = 15;
pub const NPPV_FORM_VALUE: NPPVariable = 16;
pub const NPPV_PLUGIN_URL_REQUESTS_DISPLAYED_BOOL: NPPVariable = 17;
pub const NPPV_PLUGIN_WANTS_ALL_NETWORK_STREAMS: NPPVariable = 18;
pub const NPPV_PLUGIN_CANCEL_SRC_STREAM: NPPVariable = 20;
pub const NPPV_PLUGIN_DRAWING_MODEL: NPPVariable = 1000;

/// URL-scoped values (`getvalueforurl`/`setvalueforurl`).
pub type NPNURLVariable = i32;
pub const NPNURLV_COOKIE: NPNURLVariable = 501;
pub const NPNURLV_PROXY: NPNURLVariable = 502;

/// Instance handle. `pdata` belongs to the plugin, `ndata` to the host.
#[repr(C)]
#[derive(Debug)]
pub struct NPP_t {
    pub pdata: *mut c_void,
    pub ndata: *mut c_void,
}

pub type NPP = *mut NPP_t;

impl Default for NPP_t {
    fn default() -> Self {
        Self {
            pdata: ptr::null_mut(),
            ndata: ptr::null_mut(),
        }
    }
}

/// One network-load-to-plugin data channel as the plugin sees it.
#[repr(C)]
#[derive(Debug)]
pub struct NPStream {
    pub pdata: *mut c_void,
    pub ndata: *mut c_void,
    pub url: *const c_char,
    pub end: u32,
    pub lastmodified: u32,
    pub notify_data: *mut c_void,
    pub headers: *const c_char,
}

impl Default for NPStream {
    fn default() -> Self {
        Self {
            pdata: ptr::null_mut(),
            ndata: ptr::null_mut(),
            url: ptr::null(),
            end: 0,
            lastmodified: 0,
            notify_data: ptr::null_mut(),
            headers: ptr::null(),
        }
    }
}

/// Byte range for `requestread`.
#[repr(C)]
#[derive(Debug)]
pub struct NPByteRange {
    pub offset: i32,
    pub length: u32,
    pub next: *mut NPByteRange,
}

/// Opaque data a plugin may hand back from `destroy`.
#[repr(C)]
#[derive(Debug)]
pub struct NPSavedData {
    pub len: i32,
    pub buf: *mut c_void,
}

/// Rectangle in the plugin's coordinate space.
///
/// Field order is top, left, bottom, right.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NPRect {
    pub top: u16,
    pub left: u16,
    pub bottom: u16,
    pub right: u16,
}

impl NPRect {
    /// Zero-area rectangle; tells the plugin it is scrolled out of view.
    pub const ZERO: Self = Self { top: 0, left: 0, bottom: 0, right: 0 };

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

/// Window descriptor passed to `setwindow`.
#[repr(C)]
#[derive(Debug)]
pub struct NPWindow {
    pub window: *mut c_void,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub clip_rect: NPRect,
    #[cfg(all(unix, not(target_os = "macos")))]
    pub ws_info: *mut c_void,
    pub window_type: NPWindowType,
}

impl Default for NPWindow {
    fn default() -> Self {
        Self {
            window: ptr::null_mut(),
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            clip_rect: NPRect::ZERO,
            #[cfg(all(unix, not(target_os = "macos")))]
            ws_info: ptr::null_mut(),
            window_type: NP_WINDOW_TYPE_WINDOW,
        }
    }
}

/// Split a packed table version into `(major, minor)`.
#[inline]
pub const fn split_version(version: u16) -> (u16, u16) {
    (version >> 8, version & 0xff)
}
