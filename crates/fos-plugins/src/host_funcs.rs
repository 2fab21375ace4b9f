//! Host function table
//!
//! The `extern "C"` entry points handed to every module in
//! `NPNetscapeFuncs`. Each one resolves its instance handle through the
//! registry in [`crate::context`] and forwards to the view. A panic never
//! crosses back into plugin code; it is logged and the call fails.

use std::ffi::{CStr, CString, c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::LazyLock;

use fos_npapi::*;

use crate::config::MOZILLA_USER_AGENT;
use crate::context;
use crate::error::{NpError, to_code};
use crate::instance::{PluginView, get_static_value};
use crate::request::NotifyData;
use crate::scripting;

static STATIC_USER_AGENT: LazyLock<CString> =
    LazyLock::new(|| CString::new(MOZILLA_USER_AGENT).unwrap_or_default());

/// Build the table handed to a module during initialization.
pub fn netscape_funcs() -> NPNetscapeFuncs {
    NPNetscapeFuncs {
        geturl: Some(np_get_url),
        posturl: Some(np_post_url),
        requestread: Some(np_request_read),
        newstream: Some(np_new_stream),
        write: Some(np_write),
        destroystream: Some(np_destroy_stream),
        status: Some(np_status),
        uagent: Some(np_user_agent),
        memalloc: Some(np_mem_alloc),
        memfree: Some(np_mem_free),
        memflush: Some(np_mem_flush),
        reloadplugins: Some(np_reload_plugins),
        get_java_env: Some(np_get_java_env),
        get_java_peer: Some(np_get_java_peer),
        geturlnotify: Some(np_get_url_notify),
        posturlnotify: Some(np_post_url_notify),
        getvalue: Some(np_get_value),
        setvalue: Some(np_set_value),
        invalidaterect: Some(np_invalidate_rect),
        invalidateregion: Some(np_invalidate_region),
        forceredraw: Some(np_force_redraw),
        getstringidentifier: Some(np_get_string_identifier),
        getstringidentifiers: Some(np_get_string_identifiers),
        getintidentifier: Some(np_get_int_identifier),
        identifierisstring: Some(np_identifier_is_string),
        utf8fromidentifier: Some(np_utf8_from_identifier),
        intfromidentifier: Some(np_int_from_identifier),
        createobject: Some(np_create_object),
        retainobject: Some(np_retain_object),
        releaseobject: Some(np_release_object),
        invoke: Some(np_invoke),
        invoke_default: Some(np_invoke_default),
        evaluate: Some(np_evaluate),
        getproperty: Some(np_get_property),
        setproperty: Some(np_set_property),
        removeproperty: Some(np_remove_property),
        hasproperty: Some(np_has_property),
        hasmethod: Some(np_has_method),
        releasevariantvalue: Some(np_release_variant_value),
        setexception: Some(np_set_exception),
        pushpopupsenabledstate: Some(np_push_popups_enabled_state),
        poppopupsenabledstate: Some(np_pop_popups_enabled_state),
        enumerate: Some(np_enumerate),
        pluginthreadasynccall: Some(np_plugin_thread_async_call),
        construct: Some(np_construct),
        getvalueforurl: Some(np_get_value_for_url),
        setvalueforurl: Some(np_set_value_for_url),
        getauthenticationinfo: Some(np_get_authentication_info),
        scheduletimer: Some(np_schedule_timer),
        unscheduletimer: Some(np_unschedule_timer),
        popupcontextmenu: Some(np_pop_up_context_menu),
        convertpoint: Some(np_convert_point),
        handleevent: Some(np_handle_event),
        unfocusinstance: Some(np_unfocus_instance),
        urlredirectresponse: Some(np_url_redirect_response),
        ..NPNetscapeFuncs::default()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Run `f`, turning a panic into `fallback`.
fn guarded<R: Copy>(name: &str, fallback: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Host call {} panicked", name);
            fallback
        }
    }
}

/// Resolve `npp` and run `f` on its view.
fn with_view<R: Copy>(npp: NPP, name: &str, fallback: R, f: impl FnOnce(&PluginView) -> R) -> R {
    guarded(name, fallback, || match context::instance_for(npp) {
        Some(view) => f(&view),
        None => {
            tracing::debug!("{} called for unknown instance {:p}", name, npp);
            fallback
        }
    })
}

/// # Safety
/// `ptr` must be null or NUL-terminated.
unsafe fn opt_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// # Safety
/// `ptr` must be null or valid for `len` bytes.
unsafe fn bytes<'a>(ptr: *const c_char, len: u32) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(ptr as *const u8, len as usize) }
}

// ============================================================================
// REQUESTS AND STREAMS
// ============================================================================

unsafe extern "C" fn np_get_url(instance: NPP, url: *const c_char, target: *const c_char) -> NPError {
    with_view(instance, "geturl", NPERR_INVALID_INSTANCE_ERROR, |view| {
        let (url, target) = unsafe { (opt_str(url), opt_str(target)) };
        let Some(url) = url else {
            return NPERR_INVALID_URL;
        };
        to_code(view.get_url(url, target))
    })
}

unsafe extern "C" fn np_get_url_notify(
    instance: NPP,
    url: *const c_char,
    target: *const c_char,
    notify_data: *mut c_void,
) -> NPError {
    with_view(instance, "geturlnotify", NPERR_INVALID_INSTANCE_ERROR, |view| {
        let (url, target) = unsafe { (opt_str(url), opt_str(target)) };
        let Some(url) = url else {
            return NPERR_INVALID_URL;
        };
        to_code(view.get_url_notify(url, target, NotifyData(notify_data)))
    })
}

unsafe extern "C" fn np_post_url(
    instance: NPP,
    url: *const c_char,
    target: *const c_char,
    len: u32,
    buf: *const c_char,
    file: NPBool,
) -> NPError {
    with_view(instance, "posturl", NPERR_INVALID_INSTANCE_ERROR, |view| {
        let (url, target, buffer) = unsafe { (opt_str(url), opt_str(target), bytes(buf, len)) };
        to_code(view.post_url(url.unwrap_or_default(), target, buffer, file != 0))
    })
}

unsafe extern "C" fn np_post_url_notify(
    instance: NPP,
    url: *const c_char,
    target: *const c_char,
    len: u32,
    buf: *const c_char,
    file: NPBool,
    notify_data: *mut c_void,
) -> NPError {
    with_view(instance, "posturlnotify", NPERR_INVALID_INSTANCE_ERROR, |view| {
        let (url, target, buffer) = unsafe { (opt_str(url), opt_str(target), bytes(buf, len)) };
        to_code(view.post_url_notify(url.unwrap_or_default(), target, buffer, file != 0, NotifyData(notify_data)))
    })
}

unsafe extern "C" fn np_request_read(_stream: *mut NPStream, _ranges: *mut NPByteRange) -> NPError {
    NPERR_STREAM_NOT_SEEKABLE
}

// Plugin-originated streams are not supported.
unsafe extern "C" fn np_new_stream(
    _instance: NPP,
    _mime_type: NPMIMEType,
    _target: *const c_char,
    _stream: *mut *mut NPStream,
) -> NPError {
    NPERR_GENERIC_ERROR
}

unsafe extern "C" fn np_write(_instance: NPP, _stream: *mut NPStream, _len: i32, _buffer: *mut c_void) -> i32 {
    -1
}

unsafe extern "C" fn np_destroy_stream(instance: NPP, stream: *mut NPStream, reason: NPReason) -> NPError {
    with_view(instance, "destroystream", NPERR_INVALID_INSTANCE_ERROR, |view| {
        to_code(view.destroy_stream(stream, reason))
    })
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

unsafe extern "C" fn np_status(instance: NPP, message: *const c_char) {
    with_view(instance, "status", (), |view| {
        let text = unsafe { opt_str(message) }.unwrap_or_default();
        view.set_status_text(text);
    })
}

unsafe extern "C" fn np_user_agent(instance: NPP) -> *const c_char {
    guarded("uagent", STATIC_USER_AGENT.as_ptr(), || match context::instance_for(instance) {
        Some(view) => view.user_agent(),
        // Plugins ask before creating any instance.
        None => STATIC_USER_AGENT.as_ptr(),
    })
}

unsafe extern "C" fn np_mem_alloc(size: u32) -> *mut c_void {
    scripting::mem_alloc(size as usize)
}

unsafe extern "C" fn np_mem_free(ptr: *mut c_void) {
    unsafe { scripting::mem_free(ptr) }
}

unsafe extern "C" fn np_mem_flush(_size: u32) -> u32 {
    0
}

unsafe extern "C" fn np_reload_plugins(_reload_pages: NPBool) {
    tracing::debug!("Plugin asked for a plugin directory reload; ignored");
}

unsafe extern "C" fn np_get_java_env() -> *mut c_void {
    ptr::null_mut()
}

unsafe extern "C" fn np_get_java_peer(_instance: NPP) -> *mut c_void {
    ptr::null_mut()
}

unsafe extern "C" fn np_get_value(instance: NPP, variable: NPNVariable, value: *mut c_void) -> NPError {
    guarded("getvalue", NPERR_GENERIC_ERROR, || {
        let result = match context::instance_for(instance) {
            Some(view) => unsafe { view.get_value(variable, value) },
            None => unsafe { get_static_value(variable, value) },
        };
        to_code(result)
    })
}

unsafe extern "C" fn np_set_value(instance: NPP, variable: NPPVariable, value: *mut c_void) -> NPError {
    with_view(instance, "setvalue", NPERR_INVALID_INSTANCE_ERROR, |view| to_code(view.set_value(variable, value)))
}

unsafe extern "C" fn np_invalidate_rect(instance: NPP, rect: *mut NPRect) {
    if rect.is_null() {
        return;
    }
    with_view(instance, "invalidaterect", (), |view| view.invalidate_rect(unsafe { *rect }))
}

unsafe extern "C" fn np_invalidate_region(instance: NPP, region: NPRegion) {
    with_view(instance, "invalidateregion", (), |view| view.invalidate_region(region))
}

unsafe extern "C" fn np_force_redraw(instance: NPP) {
    with_view(instance, "forceredraw", (), |view| view.force_redraw())
}

unsafe extern "C" fn np_get_value_for_url(
    instance: NPP,
    variable: NPNURLVariable,
    url: *const c_char,
    value: *mut *mut c_char,
    len: *mut u32,
) -> NPError {
    if value.is_null() {
        return NPERR_INVALID_PARAM;
    }
    with_view(instance, "getvalueforurl", NPERR_INVALID_INSTANCE_ERROR, |view| {
        let Some(url) = (unsafe { opt_str(url) }) else {
            return NPERR_INVALID_URL;
        };
        let text = match view.value_for_url(variable, url) {
            Ok(Some(text)) => text,
            Ok(None) => String::new(),
            Err(err) => return err.code(),
        };
        let copy = scripting::alloc_c_string(&text);
        if copy.is_null() {
            return NpError::OutOfMemory.code();
        }
        unsafe {
            *value = copy;
            if !len.is_null() {
                *len = text.len() as u32;
            }
        }
        NPERR_NO_ERROR
    })
}

unsafe extern "C" fn np_set_value_for_url(
    instance: NPP,
    variable: NPNURLVariable,
    url: *const c_char,
    value: *const c_char,
    len: u32,
) -> NPError {
    with_view(instance, "setvalueforurl", NPERR_INVALID_INSTANCE_ERROR, |view| {
        let Some(url) = (unsafe { opt_str(url) }) else {
            return NPERR_INVALID_URL;
        };
        let value = String::from_utf8_lossy(unsafe { bytes(value, len) });
        to_code(view.set_value_for_url(variable, url, &value))
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn np_get_authentication_info(
    _instance: NPP,
    _protocol: *const c_char,
    _host: *const c_char,
    _port: i32,
    _scheme: *const c_char,
    _realm: *const c_char,
    _username: *mut *mut c_char,
    _ulen: *mut u32,
    _password: *mut *mut c_char,
    _plen: *mut u32,
) -> NPError {
    NPERR_GENERIC_ERROR
}

// ============================================================================
// TIMERS, ASYNC CALLS, POPUPS
// ============================================================================

unsafe extern "C" fn np_schedule_timer(
    instance: NPP,
    interval: u32,
    repeat: NPBool,
    func: Option<unsafe extern "C" fn(NPP, u32)>,
) -> u32 {
    let Some(func) = func else {
        return 0;
    };
    with_view(instance, "scheduletimer", 0, |view| view.schedule_timer(interval, repeat != 0, func))
}

unsafe extern "C" fn np_unschedule_timer(instance: NPP, timer_id: u32) {
    with_view(instance, "unscheduletimer", (), |view| view.unschedule_timer(timer_id))
}

unsafe extern "C" fn np_plugin_thread_async_call(
    instance: NPP,
    func: Option<unsafe extern "C" fn(*mut c_void)>,
    data: *mut c_void,
) {
    let Some(func) = func else {
        return;
    };
    with_view(instance, "pluginthreadasynccall", (), |view| {
        if let Err(err) = view.plugin_thread_async_call(func, data) {
            tracing::debug!("Async call dropped: {}", err);
        }
    })
}

unsafe extern "C" fn np_push_popups_enabled_state(instance: NPP, enabled: NPBool) {
    with_view(instance, "pushpopupsenabledstate", (), |view| view.push_popups_enabled_state(enabled != 0))
}

unsafe extern "C" fn np_pop_popups_enabled_state(instance: NPP) {
    with_view(instance, "poppopupsenabledstate", (), |view| view.pop_popups_enabled_state())
}

unsafe extern "C" fn np_pop_up_context_menu(_instance: NPP, _menu: *mut c_void) -> NPError {
    NPERR_GENERIC_ERROR
}

unsafe extern "C" fn np_convert_point(
    _instance: NPP,
    _source_x: f64,
    _source_y: f64,
    _source_space: i32,
    _dest_x: *mut f64,
    _dest_y: *mut f64,
    _dest_space: i32,
) -> NPBool {
    0
}

unsafe extern "C" fn np_handle_event(_instance: NPP, _event: *mut c_void, _handled: NPBool) -> NPBool {
    0
}

unsafe extern "C" fn np_unfocus_instance(_instance: NPP, _direction: i32) -> NPBool {
    0
}

unsafe extern "C" fn np_url_redirect_response(_instance: NPP, _notify_data: *mut c_void, _allow: NPBool) {}

// ============================================================================
// SCRIPTING
// ============================================================================

unsafe extern "C" fn np_get_string_identifier(name: *const NPUTF8) -> NPIdentifier {
    if name.is_null() {
        return ptr::null_mut();
    }
    guarded("getstringidentifier", ptr::null_mut(), || {
        scripting::string_identifier(unsafe { CStr::from_ptr(name) })
    })
}

unsafe extern "C" fn np_get_string_identifiers(names: *mut *const NPUTF8, count: i32, identifiers: *mut NPIdentifier) {
    if names.is_null() || identifiers.is_null() || count <= 0 {
        return;
    }
    guarded("getstringidentifiers", (), || {
        for i in 0..count as usize {
            unsafe {
                let name = *names.add(i);
                *identifiers.add(i) = if name.is_null() {
                    ptr::null_mut()
                } else {
                    scripting::string_identifier(CStr::from_ptr(name))
                };
            }
        }
    })
}

unsafe extern "C" fn np_get_int_identifier(value: i32) -> NPIdentifier {
    guarded("getintidentifier", ptr::null_mut(), || scripting::int_identifier(value))
}

unsafe extern "C" fn np_identifier_is_string(identifier: NPIdentifier) -> bool {
    guarded("identifierisstring", false, || scripting::identifier_is_string(identifier))
}

unsafe extern "C" fn np_utf8_from_identifier(identifier: NPIdentifier) -> *mut NPUTF8 {
    guarded("utf8fromidentifier", ptr::null_mut(), || scripting::utf8_from_identifier(identifier))
}

unsafe extern "C" fn np_int_from_identifier(identifier: NPIdentifier) -> i32 {
    guarded("intfromidentifier", i32::MIN, || scripting::int_from_identifier(identifier))
}

unsafe extern "C" fn np_create_object(npp: NPP, class: *mut NPClass) -> *mut NPObject {
    guarded("createobject", ptr::null_mut(), || unsafe { scripting::create_object(npp, class) })
}

unsafe extern "C" fn np_retain_object(object: *mut NPObject) -> *mut NPObject {
    unsafe { scripting::retain_object(object) }
}

unsafe extern "C" fn np_release_object(object: *mut NPObject) {
    guarded("releaseobject", (), || unsafe { scripting::release_object(object) })
}

unsafe extern "C" fn np_invoke(
    _npp: NPP,
    object: *mut NPObject,
    method: NPIdentifier,
    args: *const NPVariant,
    arg_count: u32,
    result: *mut NPVariant,
) -> bool {
    guarded("invoke", false, || unsafe { scripting::invoke(object, method, args, arg_count, result) })
}

unsafe extern "C" fn np_invoke_default(
    _npp: NPP,
    object: *mut NPObject,
    args: *const NPVariant,
    arg_count: u32,
    result: *mut NPVariant,
) -> bool {
    guarded("invokedefault", false, || unsafe { scripting::invoke_default(object, args, arg_count, result) })
}

unsafe extern "C" fn np_construct(
    _npp: NPP,
    object: *mut NPObject,
    args: *const NPVariant,
    arg_count: u32,
    result: *mut NPVariant,
) -> bool {
    guarded("construct", false, || unsafe { scripting::construct(object, args, arg_count, result) })
}

unsafe extern "C" fn np_evaluate(npp: NPP, _object: *mut NPObject, script: *mut NPString, result: *mut NPVariant) -> bool {
    if result.is_null() {
        return false;
    }
    with_view(npp, "evaluate", false, |view| {
        let Some(source) = (unsafe { scripting::npstring_to_string(script) }) else {
            return false;
        };
        let Some(value) = view.evaluate(&source) else {
            return false;
        };
        unsafe { *result = scripting::variant_from_script_value(&value) };
        true
    })
}

unsafe extern "C" fn np_get_property(_npp: NPP, object: *mut NPObject, name: NPIdentifier, result: *mut NPVariant) -> bool {
    guarded("getproperty", false, || unsafe { scripting::get_property(object, name, result) })
}

unsafe extern "C" fn np_set_property(
    _npp: NPP,
    object: *mut NPObject,
    name: NPIdentifier,
    value: *const NPVariant,
) -> bool {
    guarded("setproperty", false, || unsafe { scripting::set_property(object, name, value) })
}

unsafe extern "C" fn np_remove_property(_npp: NPP, object: *mut NPObject, name: NPIdentifier) -> bool {
    guarded("removeproperty", false, || unsafe { scripting::remove_property(object, name) })
}

unsafe extern "C" fn np_has_property(_npp: NPP, object: *mut NPObject, name: NPIdentifier) -> bool {
    guarded("hasproperty", false, || unsafe { scripting::has_property(object, name) })
}

unsafe extern "C" fn np_has_method(_npp: NPP, object: *mut NPObject, name: NPIdentifier) -> bool {
    guarded("hasmethod", false, || unsafe { scripting::has_method(object, name) })
}

unsafe extern "C" fn np_enumerate(
    _npp: NPP,
    object: *mut NPObject,
    identifiers: *mut *mut NPIdentifier,
    count: *mut u32,
) -> bool {
    guarded("enumerate", false, || unsafe { scripting::enumerate(object, identifiers, count) })
}

unsafe extern "C" fn np_release_variant_value(variant: *mut NPVariant) {
    guarded("releasevariantvalue", (), || unsafe { scripting::release_variant_value(variant) })
}

unsafe extern "C" fn np_set_exception(object: *mut NPObject, message: *const NPUTF8) {
    unsafe { scripting::set_exception(object, message) }
}
