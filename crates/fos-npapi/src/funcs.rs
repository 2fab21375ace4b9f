//! Function Tables and Entry Points
//!
//! The host hands `NPNetscapeFuncs` to the plugin during initialization and
//! receives `NPPluginFuncs` back. Field order is the wire layout; do not
//! reorder.

use std::ffi::{c_char, c_void};
use std::mem;

use crate::runtime::{NPClass, NPIdentifier, NPObject, NPString, NPUTF8, NPVariant};
use crate::types::*;

// ============================================================================
// HOST-SUPPLIED CALLS
// ============================================================================

pub type NPN_GetURLProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, url: *const c_char, window: *const c_char) -> NPError>;
pub type NPN_PostURLProcPtr = Option<
    unsafe extern "C" fn(
        instance: NPP,
        url: *const c_char,
        window: *const c_char,
        len: u32,
        buf: *const c_char,
        file: NPBool,
    ) -> NPError,
>;
pub type NPN_RequestReadProcPtr = Option<unsafe extern "C" fn(stream: *mut NPStream, range_list: *mut NPByteRange) -> NPError>;
pub type NPN_NewStreamProcPtr = Option<
    unsafe extern "C" fn(instance: NPP, mime_type: NPMIMEType, window: *const c_char, stream: *mut *mut NPStream) -> NPError,
>;
pub type NPN_WriteProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, stream: *mut NPStream, len: i32, buffer: *mut c_void) -> i32>;
pub type NPN_DestroyStreamProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, stream: *mut NPStream, reason: NPReason) -> NPError>;
pub type NPN_StatusProcPtr = Option<unsafe extern "C" fn(instance: NPP, message: *const c_char)>;
pub type NPN_UserAgentProcPtr = Option<unsafe extern "C" fn(instance: NPP) -> *const c_char>;
pub type NPN_MemAllocProcPtr = Option<unsafe extern "C" fn(size: u32) -> *mut c_void>;
pub type NPN_MemFreeProcPtr = Option<unsafe extern "C" fn(ptr: *mut c_void)>;
pub type NPN_MemFlushProcPtr = Option<unsafe extern "C" fn(size: u32) -> u32>;
pub type NPN_ReloadPluginsProcPtr = Option<unsafe extern "C" fn(reload_pages: NPBool)>;
pub type NPN_GetJavaEnvProcPtr = Option<unsafe extern "C" fn() -> *mut c_void>;
pub type NPN_GetJavaPeerProcPtr = Option<unsafe extern "C" fn(instance: NPP) -> *mut c_void>;
pub type NPN_GetURLNotifyProcPtr = Option<
    unsafe extern "C" fn(instance: NPP, url: *const c_char, window: *const c_char, notify_data: *mut c_void) -> NPError,
>;
pub type NPN_PostURLNotifyProcPtr = Option<
    unsafe extern "C" fn(
        instance: NPP,
        url: *const c_char,
        window: *const c_char,
        len: u32,
        buf: *const c_char,
        file: NPBool,
        notify_data: *mut c_void,
    ) -> NPError,
>;
pub type NPN_GetValueProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, variable: NPNVariable, value: *mut c_void) -> NPError>;
pub type NPN_SetValueProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, variable: NPPVariable, value: *mut c_void) -> NPError>;
pub type NPN_InvalidateRectProcPtr = Option<unsafe extern "C" fn(instance: NPP, rect: *mut NPRect)>;
pub type NPN_InvalidateRegionProcPtr = Option<unsafe extern "C" fn(instance: NPP, region: NPRegion)>;
pub type NPN_ForceRedrawProcPtr = Option<unsafe extern "C" fn(instance: NPP)>;
pub type NPN_GetStringIdentifierProcPtr = Option<unsafe extern "C" fn(name: *const NPUTF8) -> NPIdentifier>;
pub type NPN_GetStringIdentifiersProcPtr =
    Option<unsafe extern "C" fn(names: *mut *const NPUTF8, name_count: i32, identifiers: *mut NPIdentifier)>;
pub type NPN_GetIntIdentifierProcPtr = Option<unsafe extern "C" fn(intid: i32) -> NPIdentifier>;
pub type NPN_IdentifierIsStringProcPtr = Option<unsafe extern "C" fn(identifier: NPIdentifier) -> bool>;
pub type NPN_UTF8FromIdentifierProcPtr = Option<unsafe extern "C" fn(identifier: NPIdentifier) -> *mut NPUTF8>;
pub type NPN_IntFromIdentifierProcPtr = Option<unsafe extern "C" fn(identifier: NPIdentifier) -> i32>;
pub type NPN_CreateObjectProcPtr = Option<unsafe extern "C" fn(npp: NPP, class: *mut NPClass) -> *mut NPObject>;
pub type NPN_RetainObjectProcPtr = Option<unsafe extern "C" fn(obj: *mut NPObject) -> *mut NPObject>;
pub type NPN_ReleaseObjectProcPtr = Option<unsafe extern "C" fn(obj: *mut NPObject)>;
pub type NPN_InvokeProcPtr = Option<
    unsafe extern "C" fn(
        npp: NPP,
        obj: *mut NPObject,
        method_name: NPIdentifier,
        args: *const NPVariant,
        arg_count: u32,
        result: *mut NPVariant,
    ) -> bool,
>;
pub type NPN_InvokeDefaultProcPtr = Option<
    unsafe extern "C" fn(
        npp: NPP,
        obj: *mut NPObject,
        args: *const NPVariant,
        arg_count: u32,
        result: *mut NPVariant,
    ) -> bool,
>;
pub type NPN_EvaluateProcPtr =
    Option<unsafe extern "C" fn(npp: NPP, obj: *mut NPObject, script: *mut NPString, result: *mut NPVariant) -> bool>;
pub type NPN_GetPropertyProcPtr = Option<
    unsafe extern "C" fn(npp: NPP, obj: *mut NPObject, property_name: NPIdentifier, result: *mut NPVariant) -> bool,
>;
pub type NPN_SetPropertyProcPtr = Option<
    unsafe extern "C" fn(npp: NPP, obj: *mut NPObject, property_name: NPIdentifier, value: *const NPVariant) -> bool,
>;
pub type NPN_RemovePropertyProcPtr =
    Option<unsafe extern "C" fn(npp: NPP, obj: *mut NPObject, property_name: NPIdentifier) -> bool>;
pub type NPN_HasPropertyProcPtr =
    Option<unsafe extern "C" fn(npp: NPP, obj: *mut NPObject, property_name: NPIdentifier) -> bool>;
pub type NPN_HasMethodProcPtr =
    Option<unsafe extern "C" fn(npp: NPP, obj: *mut NPObject, method_name: NPIdentifier) -> bool>;
pub type NPN_ReleaseVariantValueProcPtr = Option<unsafe extern "C" fn(variant: *mut NPVariant)>;
pub type NPN_SetExceptionProcPtr = Option<unsafe extern "C" fn(obj: *mut NPObject, message: *const NPUTF8)>;
pub type NPN_PushPopupsEnabledStateProcPtr = Option<unsafe extern "C" fn(npp: NPP, enabled: NPBool)>;
pub type NPN_PopPopupsEnabledStateProcPtr = Option<unsafe extern "C" fn(npp: NPP)>;
pub type NPN_EnumerateProcPtr = Option<
    unsafe extern "C" fn(npp: NPP, obj: *mut NPObject, identifier: *mut *mut NPIdentifier, count: *mut u32) -> bool,
>;
pub type NPN_PluginThreadAsyncCallProcPtr =
    Option<unsafe extern "C" fn(npp: NPP, func: Option<unsafe extern "C" fn(*mut c_void)>, user_data: *mut c_void)>;
pub type NPN_ConstructProcPtr = Option<
    unsafe extern "C" fn(
        npp: NPP,
        obj: *mut NPObject,
        args: *const NPVariant,
        arg_count: u32,
        result: *mut NPVariant,
    ) -> bool,
>;
pub type NPN_GetValueForURLPtr = Option<
    unsafe extern "C" fn(
        npp: NPP,
        variable: NPNURLVariable,
        url: *const c_char,
        value: *mut *mut c_char,
        len: *mut u32,
    ) -> NPError,
>;
pub type NPN_SetValueForURLPtr = Option<
    unsafe extern "C" fn(
        npp: NPP,
        variable: NPNURLVariable,
        url: *const c_char,
        value: *const c_char,
        len: u32,
    ) -> NPError,
>;
pub type NPN_GetAuthenticationInfoPtr = Option<
    unsafe extern "C" fn(
        npp: NPP,
        protocol: *const c_char,
        host: *const c_char,
        port: i32,
        scheme: *const c_char,
        realm: *const c_char,
        username: *mut *mut c_char,
        ulen: *mut u32,
        password: *mut *mut c_char,
        plen: *mut u32,
    ) -> NPError,
>;
pub type NPN_ScheduleTimerPtr = Option<
    unsafe extern "C" fn(
        instance: NPP,
        interval: u32,
        repeat: NPBool,
        timer_func: Option<unsafe extern "C" fn(npp: NPP, timer_id: u32)>,
    ) -> u32,
>;
pub type NPN_UnscheduleTimerPtr = Option<unsafe extern "C" fn(instance: NPP, timer_id: u32)>;
pub type NPN_PopUpContextMenuPtr = Option<unsafe extern "C" fn(instance: NPP, menu: *mut c_void) -> NPError>;
pub type NPN_ConvertPointPtr = Option<
    unsafe extern "C" fn(
        instance: NPP,
        source_x: f64,
        source_y: f64,
        source_space: i32,
        dest_x: *mut f64,
        dest_y: *mut f64,
        dest_space: i32,
    ) -> NPBool,
>;
pub type NPN_HandleEventPtr = Option<unsafe extern "C" fn(instance: NPP, event: *mut c_void, handled: NPBool) -> NPBool>;
pub type NPN_UnfocusInstancePtr = Option<unsafe extern "C" fn(instance: NPP, direction: i32) -> NPBool>;
pub type NPN_URLRedirectResponsePtr = Option<unsafe extern "C" fn(instance: NPP, notify_data: *mut c_void, allow: NPBool)>;

/// Calls the host offers the plugin.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NPNetscapeFuncs {
    pub size: u16,
    pub version: u16,
    pub geturl: NPN_GetURLProcPtr,
    pub posturl: NPN_PostURLProcPtr,
    pub requestread: NPN_RequestReadProcPtr,
    pub newstream: NPN_NewStreamProcPtr,
    pub write: NPN_WriteProcPtr,
    pub destroystream: NPN_DestroyStreamProcPtr,
    pub status: NPN_StatusProcPtr,
    pub uagent: NPN_UserAgentProcPtr,
    pub memalloc: NPN_MemAllocProcPtr,
    pub memfree: NPN_MemFreeProcPtr,
    pub memflush: NPN_MemFlushProcPtr,
    pub reloadplugins: NPN_ReloadPluginsProcPtr,
    pub get_java_env: NPN_GetJavaEnvProcPtr,
    pub get_java_peer: NPN_GetJavaPeerProcPtr,
    pub geturlnotify: NPN_GetURLNotifyProcPtr,
    pub posturlnotify: NPN_PostURLNotifyProcPtr,
    pub getvalue: NPN_GetValueProcPtr,
    pub setvalue: NPN_SetValueProcPtr,
    pub invalidaterect: NPN_InvalidateRectProcPtr,
    pub invalidateregion: NPN_InvalidateRegionProcPtr,
    pub forceredraw: NPN_ForceRedrawProcPtr,
    pub getstringidentifier: NPN_GetStringIdentifierProcPtr,
    pub getstringidentifiers: NPN_GetStringIdentifiersProcPtr,
    pub getintidentifier: NPN_GetIntIdentifierProcPtr,
    pub identifierisstring: NPN_IdentifierIsStringProcPtr,
    pub utf8fromidentifier: NPN_UTF8FromIdentifierProcPtr,
    pub intfromidentifier: NPN_IntFromIdentifierProcPtr,
    pub createobject: NPN_CreateObjectProcPtr,
    pub retainobject: NPN_RetainObjectProcPtr,
    pub releaseobject: NPN_ReleaseObjectProcPtr,
    pub invoke: NPN_InvokeProcPtr,
    pub invoke_default: NPN_InvokeDefaultProcPtr,
    pub evaluate: NPN_EvaluateProcPtr,
    pub getproperty: NPN_GetPropertyProcPtr,
    pub setproperty: NPN_SetPropertyProcPtr,
    pub removeproperty: NPN_RemovePropertyProcPtr,
    pub hasproperty: NPN_HasPropertyProcPtr,
    pub hasmethod: NPN_HasMethodProcPtr,
    pub releasevariantvalue: NPN_ReleaseVariantValueProcPtr,
    pub setexception: NPN_SetExceptionProcPtr,
    pub pushpopupsenabledstate: NPN_PushPopupsEnabledStateProcPtr,
    pub poppopupsenabledstate: NPN_PopPopupsEnabledStateProcPtr,
    pub enumerate: NPN_EnumerateProcPtr,
    pub pluginthreadasynccall: NPN_PluginThreadAsyncCallProcPtr,
    pub construct: NPN_ConstructProcPtr,
    pub getvalueforurl: NPN_GetValueForURLPtr,
    pub setvalueforurl: NPN_SetValueForURLPtr,
    pub getauthenticationinfo: NPN_GetAuthenticationInfoPtr,
    pub scheduletimer: NPN_ScheduleTimerPtr,
    pub unscheduletimer: NPN_UnscheduleTimerPtr,
    pub popupcontextmenu: NPN_PopUpContextMenuPtr,
    pub convertpoint: NPN_ConvertPointPtr,
    pub handleevent: NPN_HandleEventPtr,
    pub unfocusinstance: NPN_UnfocusInstancePtr,
    pub urlredirectresponse: NPN_URLRedirectResponsePtr,
}

impl Default for NPNetscapeFuncs {
    fn default() -> Self {
        // SAFETY: every field is an integer or an `Option` of a function
        // pointer; all-zero is `0`/`None` for each of them.
        let mut funcs: Self = unsafe { mem::zeroed() };
        funcs.size = mem::size_of::<Self>() as u16;
        funcs.version = NP_HOST_VERSION;
        funcs
    }
}

// ============================================================================
// PLUGIN-SUPPLIED CALLS
// ============================================================================

pub type NPP_NewProcPtr = Option<
    unsafe extern "C" fn(
        plugin_type: NPMIMEType,
        instance: NPP,
        mode: u16,
        argc: i16,
        argn: *mut *mut c_char,
        argv: *mut *mut c_char,
        saved: *mut NPSavedData,
    ) -> NPError,
>;
pub type NPP_DestroyProcPtr = Option<unsafe extern "C" fn(instance: NPP, save: *mut *mut NPSavedData) -> NPError>;
pub type NPP_SetWindowProcPtr = Option<unsafe extern "C" fn(instance: NPP, window: *mut NPWindow) -> NPError>;
pub type NPP_NewStreamProcPtr = Option<
    unsafe extern "C" fn(
        instance: NPP,
        mime_type: NPMIMEType,
        stream: *mut NPStream,
        seekable: NPBool,
        stype: *mut u16,
    ) -> NPError,
>;
pub type NPP_DestroyStreamProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, stream: *mut NPStream, reason: NPReason) -> NPError>;
pub type NPP_StreamAsFileProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, stream: *mut NPStream, fname: *const c_char)>;
pub type NPP_WriteReadyProcPtr = Option<unsafe extern "C" fn(instance: NPP, stream: *mut NPStream) -> i32>;
pub type NPP_WriteProcPtr = Option<
    unsafe extern "C" fn(instance: NPP, stream: *mut NPStream, offset: i32, len: i32, buffer: *mut c_void) -> i32,
>;
pub type NPP_PrintProcPtr = Option<unsafe extern "C" fn(instance: NPP, platform_print: *mut c_void)>;
pub type NPP_HandleEventProcPtr = Option<unsafe extern "C" fn(instance: NPP, event: *mut c_void) -> i16>;
pub type NPP_URLNotifyProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, url: *const c_char, reason: NPReason, notify_data: *mut c_void)>;
pub type NPP_GetValueProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, variable: NPPVariable, value: *mut c_void) -> NPError>;
pub type NPP_SetValueProcPtr =
    Option<unsafe extern "C" fn(instance: NPP, variable: NPNVariable, value: *mut c_void) -> NPError>;
pub type NPP_GotFocusPtr = Option<unsafe extern "C" fn(instance: NPP, direction: i32) -> NPBool>;
pub type NPP_LostFocusPtr = Option<unsafe extern "C" fn(instance: NPP)>;
pub type NPP_URLRedirectNotifyPtr =
    Option<unsafe extern "C" fn(instance: NPP, url: *const c_char, status: i32, notify_data: *mut c_void)>;
pub type NPP_ClearSiteDataPtr = Option<unsafe extern "C" fn(site: *const c_char, flags: u64, max_age: u64) -> NPError>;
pub type NPP_GetSitesWithDataPtr = Option<unsafe extern "C" fn() -> *mut *mut c_char>;

/// Calls the plugin offers the host. Filled in by the plugin during
/// initialization.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NPPluginFuncs {
    pub size: u16,
    pub version: u16,
    pub newp: NPP_NewProcPtr,
    pub destroy: NPP_DestroyProcPtr,
    pub setwindow: NPP_SetWindowProcPtr,
    pub newstream: NPP_NewStreamProcPtr,
    pub destroystream: NPP_DestroyStreamProcPtr,
    pub asfile: NPP_StreamAsFileProcPtr,
    pub writeready: NPP_WriteReadyProcPtr,
    pub write: NPP_WriteProcPtr,
    pub print: NPP_PrintProcPtr,
    pub event: NPP_HandleEventProcPtr,
    pub urlnotify: NPP_URLNotifyProcPtr,
    pub java_class: *mut c_void,
    pub getvalue: NPP_GetValueProcPtr,
    pub setvalue: NPP_SetValueProcPtr,
    pub gotfocus: NPP_GotFocusPtr,
    pub lostfocus: NPP_LostFocusPtr,
    pub urlredirectnotify: NPP_URLRedirectNotifyPtr,
    pub clearsitedata: NPP_ClearSiteDataPtr,
    pub getsiteswithdata: NPP_GetSitesWithDataPtr,
}

impl Default for NPPluginFuncs {
    fn default() -> Self {
        // SAFETY: integers, a raw pointer and `Option`s of function pointers;
        // all-zero is valid for each.
        let mut funcs: Self = unsafe { mem::zeroed() };
        funcs.size = mem::size_of::<Self>() as u16;
        funcs
    }
}

impl NPPluginFuncs {
    /// Minor version the plugin declared for its table.
    pub fn minor_version(&self) -> u16 {
        split_version(self.version).1
    }

    pub fn major_version(&self) -> u16 {
        split_version(self.version).0
    }
}

// ============================================================================
// MODULE ENTRY POINTS
// ============================================================================

pub const NP_INITIALIZE_SYMBOL: &[u8] = b"NP_Initialize\0";
pub const NP_SHUTDOWN_SYMBOL: &[u8] = b"NP_Shutdown\0";
pub const NP_GET_MIME_DESCRIPTION_SYMBOL: &[u8] = b"NP_GetMIMEDescription\0";
pub const NP_GET_ENTRY_POINTS_SYMBOL: &[u8] = b"NP_GetEntryPoints\0";
pub const NP_GET_VALUE_SYMBOL: &[u8] = b"NP_GetValue\0";

/// On X11-style platforms both tables are exchanged in one call.
#[cfg(all(unix, not(target_os = "macos")))]
pub type NP_InitializeFunc =
    unsafe extern "C" fn(browser_funcs: *mut NPNetscapeFuncs, plugin_funcs: *mut NPPluginFuncs) -> NPError;
/// Elsewhere the plugin table comes from `NP_GetEntryPoints`.
#[cfg(not(all(unix, not(target_os = "macos"))))]
pub type NP_InitializeFunc = unsafe extern "C" fn(browser_funcs: *mut NPNetscapeFuncs) -> NPError;

pub type NP_ShutdownFunc = unsafe extern "C" fn() -> NPError;
pub type NP_GetMIMEDescriptionFunc = unsafe extern "C" fn() -> *const c_char;
pub type NP_GetEntryPointsFunc = unsafe extern "C" fn(plugin_funcs: *mut NPPluginFuncs) -> NPError;
pub type NP_GetValueFunc =
    unsafe extern "C" fn(future: *mut c_void, variable: NPPVariable, value: *mut c_void) -> NPError;
