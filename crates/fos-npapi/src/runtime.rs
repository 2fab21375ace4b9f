//! Scripting Bridge Runtime Types
//!
//! Objects, classes, variants and identifiers shared between the host's
//! script engine and a plugin.

use std::ffi::{c_char, c_void};
use std::ptr;

use crate::types::NPP;

pub type NPUTF8 = c_char;
/// Interned property/method name. Owned by the host for the life of the process.
pub type NPIdentifier = *mut c_void;

pub const NP_CLASS_STRUCT_VERSION: u32 = 3;
pub const NP_CLASS_STRUCT_VERSION_ENUM: u32 = 2;
pub const NP_CLASS_STRUCT_VERSION_CTOR: u32 = 3;

/// UTF-8 string that is not NUL-terminated.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NPString {
    pub utf8_characters: *const NPUTF8,
    pub utf8_length: u32,
}

impl Default for NPString {
    fn default() -> Self {
        Self {
            utf8_characters: ptr::null(),
            utf8_length: 0,
        }
    }
}

pub type NPVariantType = u32;
pub const NPVARIANT_TYPE_VOID: NPVariantType = 0;
pub const NPVARIANT_TYPE_NULL: NPVariantType = 1;
pub const NPVARIANT_TYPE_BOOL: NPVariantType = 2;
pub const NPVARIANT_TYPE_INT32: NPVariantType = 3;
pub const NPVARIANT_TYPE_DOUBLE: NPVariantType = 4;
pub const NPVARIANT_TYPE_STRING: NPVariantType = 5;
pub const NPVARIANT_TYPE_OBJECT: NPVariantType = 6;

#[repr(C)]
#[derive(Clone, Copy)]
pub union NPVariantValue {
    pub bool_value: bool,
    pub int_value: i32,
    pub double_value: f64,
    pub string_value: NPString,
    pub object_value: *mut NPObject,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct NPVariant {
    pub variant_type: NPVariantType,
    pub value: NPVariantValue,
}

impl NPVariant {
    pub const fn void() -> Self {
        Self {
            variant_type: NPVARIANT_TYPE_VOID,
            value: NPVariantValue { int_value: 0 },
        }
    }

    pub const fn null() -> Self {
        Self {
            variant_type: NPVARIANT_TYPE_NULL,
            value: NPVariantValue { int_value: 0 },
        }
    }

    pub const fn from_bool(value: bool) -> Self {
        Self {
            variant_type: NPVARIANT_TYPE_BOOL,
            value: NPVariantValue { bool_value: value },
        }
    }

    pub const fn from_i32(value: i32) -> Self {
        Self {
            variant_type: NPVARIANT_TYPE_INT32,
            value: NPVariantValue { int_value: value },
        }
    }

    pub const fn from_f64(value: f64) -> Self {
        Self {
            variant_type: NPVARIANT_TYPE_DOUBLE,
            value: NPVariantValue { double_value: value },
        }
    }

    /// Wrap a string whose buffer the caller keeps alive.
    pub const fn from_npstring(value: NPString) -> Self {
        Self {
            variant_type: NPVARIANT_TYPE_STRING,
            value: NPVariantValue { string_value: value },
        }
    }

    pub const fn from_object(object: *mut NPObject) -> Self {
        Self {
            variant_type: NPVARIANT_TYPE_OBJECT,
            value: NPVariantValue { object_value: object },
        }
    }

    pub fn is_string(&self) -> bool {
        self.variant_type == NPVARIANT_TYPE_STRING
    }

    pub fn is_object(&self) -> bool {
        self.variant_type == NPVARIANT_TYPE_OBJECT
    }
}

impl Default for NPVariant {
    fn default() -> Self {
        Self::void()
    }
}

impl std::fmt::Debug for NPVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // SAFETY: the tag selects the initialised union member.
        unsafe {
            match self.variant_type {
                NPVARIANT_TYPE_VOID => write!(f, "NPVariant::Void"),
                NPVARIANT_TYPE_NULL => write!(f, "NPVariant::Null"),
                NPVARIANT_TYPE_BOOL => write!(f, "NPVariant::Bool({})", self.value.bool_value),
                NPVARIANT_TYPE_INT32 => write!(f, "NPVariant::Int32({})", self.value.int_value),
                NPVARIANT_TYPE_DOUBLE => write!(f, "NPVariant::Double({})", self.value.double_value),
                NPVARIANT_TYPE_STRING => write!(f, "NPVariant::String(len {})", self.value.string_value.utf8_length),
                NPVARIANT_TYPE_OBJECT => write!(f, "NPVariant::Object({:p})", self.value.object_value),
                other => write!(f, "NPVariant::Unknown({})", other),
            }
        }
    }
}

pub type NPAllocateFunctionPtr = Option<unsafe extern "C" fn(npp: NPP, class: *mut NPClass) -> *mut NPObject>;
pub type NPDeallocateFunctionPtr = Option<unsafe extern "C" fn(obj: *mut NPObject)>;
pub type NPInvalidateFunctionPtr = Option<unsafe extern "C" fn(obj: *mut NPObject)>;
pub type NPHasMethodFunctionPtr = Option<unsafe extern "C" fn(obj: *mut NPObject, name: NPIdentifier) -> bool>;
pub type NPInvokeFunctionPtr = Option<
    unsafe extern "C" fn(
        obj: *mut NPObject,
        name: NPIdentifier,
        args: *const NPVariant,
        arg_count: u32,
        result: *mut NPVariant,
    ) -> bool,
>;
pub type NPInvokeDefaultFunctionPtr = Option<
    unsafe extern "C" fn(obj: *mut NPObject, args: *const NPVariant, arg_count: u32, result: *mut NPVariant) -> bool,
>;
pub type NPHasPropertyFunctionPtr = Option<unsafe extern "C" fn(obj: *mut NPObject, name: NPIdentifier) -> bool>;
pub type NPGetPropertyFunctionPtr =
    Option<unsafe extern "C" fn(obj: *mut NPObject, name: NPIdentifier, result: *mut NPVariant) -> bool>;
pub type NPSetPropertyFunctionPtr =
    Option<unsafe extern "C" fn(obj: *mut NPObject, name: NPIdentifier, value: *const NPVariant) -> bool>;
pub type NPRemovePropertyFunctionPtr = Option<unsafe extern "C" fn(obj: *mut NPObject, name: NPIdentifier) -> bool>;
pub type NPEnumerationFunctionPtr =
    Option<unsafe extern "C" fn(obj: *mut NPObject, value: *mut *mut NPIdentifier, count: *mut u32) -> bool>;
pub type NPConstructFunctionPtr = Option<
    unsafe extern "C" fn(obj: *mut NPObject, args: *const NPVariant, arg_count: u32, result: *mut NPVariant) -> bool,
>;

/// Behaviour table of a scriptable object.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NPClass {
    pub struct_version: u32,
    pub allocate: NPAllocateFunctionPtr,
    pub deallocate: NPDeallocateFunctionPtr,
    pub invalidate: NPInvalidateFunctionPtr,
    pub has_method: NPHasMethodFunctionPtr,
    pub invoke: NPInvokeFunctionPtr,
    pub invoke_default: NPInvokeDefaultFunctionPtr,
    pub has_property: NPHasPropertyFunctionPtr,
    pub get_property: NPGetPropertyFunctionPtr,
    pub set_property: NPSetPropertyFunctionPtr,
    pub remove_property: NPRemovePropertyFunctionPtr,
    pub enumerate: NPEnumerationFunctionPtr,
    pub construct: NPConstructFunctionPtr,
}

/// Header of every scriptable object; plugins extend it by embedding.
#[repr(C)]
#[derive(Debug)]
pub struct NPObject {
    pub class: *mut NPClass,
    pub reference_count: u32,
}
