//! Scripting bridge
//!
//! Identifiers, objects and variants shared with plugins. Objects follow the
//! plugin ABI's manual reference counting and the behaviour of each object is
//! whatever its class table says; the host only dispatches.
//!
//! Memory handed to a plugin (strings in variants, identifier copies, objects
//! without an allocate hook) comes from the C allocator so the plugin can
//! free it with `NPN_MemFree`.

use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr;
use std::sync::{LazyLock, Mutex};

use fos_npapi::*;

use crate::host::ScriptValue;

// ============================================================================
// MEMORY
// ============================================================================

/// Allocate plugin-visible memory.
pub fn mem_alloc(size: usize) -> *mut c_void {
    // SAFETY: plain C allocation; a null result is handed to the caller.
    unsafe { libc::malloc(size) }
}

/// Free memory from [`mem_alloc`].
///
/// # Safety
/// `ptr` must be null or come from the C allocator.
pub unsafe fn mem_free(ptr: *mut c_void) {
    unsafe { libc::free(ptr) }
}

/// Copy a string into plugin-visible memory, NUL-terminated.
pub fn alloc_c_string(value: &str) -> *mut c_char {
    let bytes = value.as_bytes();
    let out = mem_alloc(bytes.len() + 1) as *mut u8;
    if out.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: `out` holds `len + 1` bytes.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), out, bytes.len());
        *out.add(bytes.len()) = 0;
    }
    out as *mut c_char
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Interned name. Lives until the process exits.
#[derive(Debug, PartialEq, Eq)]
pub enum IdentifierRep {
    String(CString),
    Int(i32),
}

#[derive(Default)]
struct Interner {
    strings: HashMap<Vec<u8>, usize>,
    ints: HashMap<i32, usize>,
    valid: HashSet<usize>,
}

impl Interner {
    fn intern(&mut self, rep: IdentifierRep) -> NPIdentifier {
        let existing = match &rep {
            IdentifierRep::String(s) => self.strings.get(s.as_bytes()),
            IdentifierRep::Int(i) => self.ints.get(i),
        };
        if let Some(&addr) = existing {
            return addr as NPIdentifier;
        }

        let key = match &rep {
            IdentifierRep::String(s) => Some(s.as_bytes().to_vec()),
            IdentifierRep::Int(_) => None,
        };
        let int_key = match &rep {
            IdentifierRep::Int(i) => Some(*i),
            IdentifierRep::String(_) => None,
        };
        let addr = Box::into_raw(Box::new(rep)) as usize;
        if let Some(key) = key {
            self.strings.insert(key, addr);
        }
        if let Some(int_key) = int_key {
            self.ints.insert(int_key, addr);
        }
        self.valid.insert(addr);
        addr as NPIdentifier
    }
}

static IDENTIFIERS: LazyLock<Mutex<Interner>> = LazyLock::new(|| Mutex::new(Interner::default()));

fn with_interner<R>(f: impl FnOnce(&mut Interner) -> R) -> R {
    let mut guard = IDENTIFIERS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

pub fn string_identifier(name: &CStr) -> NPIdentifier {
    with_interner(|interner| interner.intern(IdentifierRep::String(name.to_owned())))
}

pub fn int_identifier(value: i32) -> NPIdentifier {
    with_interner(|interner| interner.intern(IdentifierRep::Int(value)))
}

/// Resolve an identifier handed back by a plugin; unknown handles are `None`.
pub fn identifier(id: NPIdentifier) -> Option<&'static IdentifierRep> {
    let known = with_interner(|interner| interner.valid.contains(&(id as usize)));
    // SAFETY: every address in `valid` is a leaked, never-freed box.
    known.then(|| unsafe { &*(id as *const IdentifierRep) })
}

pub fn identifier_is_string(id: NPIdentifier) -> bool {
    matches!(identifier(id), Some(IdentifierRep::String(_)))
}

/// Plugin-owned copy of a string identifier's name.
pub fn utf8_from_identifier(id: NPIdentifier) -> *mut NPUTF8 {
    match identifier(id) {
        Some(IdentifierRep::String(name)) => alloc_c_string(&name.to_string_lossy()),
        _ => ptr::null_mut(),
    }
}

pub fn int_from_identifier(id: NPIdentifier) -> i32 {
    match identifier(id) {
        Some(IdentifierRep::Int(value)) => *value,
        _ => i32::MIN,
    }
}

// ============================================================================
// OBJECTS
// ============================================================================

/// Create an object with a reference count of one.
///
/// # Safety
/// `class` must be null or a valid class table that outlives the object.
pub unsafe fn create_object(npp: NPP, class: *mut NPClass) -> *mut NPObject {
    if class.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        let object = match (*class).allocate {
            Some(allocate) => allocate(npp, class),
            None => mem_alloc(std::mem::size_of::<NPObject>()) as *mut NPObject,
        };
        if !object.is_null() {
            (*object).class = class;
            (*object).reference_count = 1;
        }
        object
    }
}

/// # Safety
/// `object` must be null or a live object.
pub unsafe fn retain_object(object: *mut NPObject) -> *mut NPObject {
    if !object.is_null() {
        unsafe { (*object).reference_count += 1 };
    }
    object
}

/// Drop one reference; the last one deallocates.
///
/// # Safety
/// `object` must be null or a live object the caller holds a reference to.
pub unsafe fn release_object(object: *mut NPObject) {
    if object.is_null() {
        return;
    }
    unsafe {
        if (*object).reference_count == 0 {
            tracing::warn!("Release of dead plugin object {:p}", object);
            return;
        }
        (*object).reference_count -= 1;
        if (*object).reference_count > 0 {
            return;
        }
        let class = (*object).class;
        match class.as_ref().and_then(|c| c.deallocate) {
            Some(deallocate) => deallocate(object),
            None => mem_free(object as *mut c_void),
        }
    }
}

/// Class table of a live object.
///
/// # Safety
/// `object` must be null or a live object.
unsafe fn class_of<'a>(object: *mut NPObject) -> Option<&'a NPClass> {
    if object.is_null() {
        return None;
    }
    unsafe { (*object).class.as_ref() }
}

/// # Safety
/// Pointers must be valid for the plugin ABI call they are forwarded to.
pub unsafe fn invoke(
    object: *mut NPObject,
    name: NPIdentifier,
    args: *const NPVariant,
    arg_count: u32,
    result: *mut NPVariant,
) -> bool {
    unsafe {
        match class_of(object).and_then(|c| c.invoke) {
            Some(f) => f(object, name, args, arg_count, result),
            None => false,
        }
    }
}

/// # Safety
/// As for [`invoke`].
pub unsafe fn invoke_default(object: *mut NPObject, args: *const NPVariant, arg_count: u32, result: *mut NPVariant) -> bool {
    unsafe {
        match class_of(object).and_then(|c| c.invoke_default) {
            Some(f) => f(object, args, arg_count, result),
            None => false,
        }
    }
}

/// Construction needs a class table new enough to carry the slot.
///
/// # Safety
/// As for [`invoke`].
pub unsafe fn construct(object: *mut NPObject, args: *const NPVariant, arg_count: u32, result: *mut NPVariant) -> bool {
    unsafe {
        match class_of(object) {
            Some(class) if class.struct_version >= NP_CLASS_STRUCT_VERSION_CTOR => match class.construct {
                Some(f) => f(object, args, arg_count, result),
                None => false,
            },
            _ => false,
        }
    }
}

/// # Safety
/// As for [`invoke`].
pub unsafe fn enumerate(object: *mut NPObject, identifiers: *mut *mut NPIdentifier, count: *mut u32) -> bool {
    unsafe {
        match class_of(object) {
            Some(class) if class.struct_version >= NP_CLASS_STRUCT_VERSION_ENUM => match class.enumerate {
                Some(f) => f(object, identifiers, count),
                None => false,
            },
            _ => false,
        }
    }
}

/// # Safety
/// As for [`invoke`].
pub unsafe fn get_property(object: *mut NPObject, name: NPIdentifier, result: *mut NPVariant) -> bool {
    unsafe {
        match class_of(object).and_then(|c| c.get_property) {
            Some(f) => f(object, name, result),
            None => false,
        }
    }
}

/// # Safety
/// As for [`invoke`].
pub unsafe fn set_property(object: *mut NPObject, name: NPIdentifier, value: *const NPVariant) -> bool {
    unsafe {
        match class_of(object).and_then(|c| c.set_property) {
            Some(f) => f(object, name, value),
            None => false,
        }
    }
}

/// # Safety
/// As for [`invoke`].
pub unsafe fn remove_property(object: *mut NPObject, name: NPIdentifier) -> bool {
    unsafe {
        match class_of(object).and_then(|c| c.remove_property) {
            Some(f) => f(object, name),
            None => false,
        }
    }
}

/// # Safety
/// As for [`invoke`].
pub unsafe fn has_property(object: *mut NPObject, name: NPIdentifier) -> bool {
    unsafe {
        match class_of(object).and_then(|c| c.has_property) {
            Some(f) => f(object, name),
            None => false,
        }
    }
}

/// # Safety
/// As for [`invoke`].
pub unsafe fn has_method(object: *mut NPObject, name: NPIdentifier) -> bool {
    unsafe {
        match class_of(object).and_then(|c| c.has_method) {
            Some(f) => f(object, name),
            None => false,
        }
    }
}

// ============================================================================
// VARIANTS
// ============================================================================

/// Convert a script result into a plugin-owned variant.
pub fn variant_from_script_value(value: &ScriptValue) -> NPVariant {
    match value {
        ScriptValue::Void => NPVariant::void(),
        ScriptValue::Null => NPVariant::null(),
        ScriptValue::Bool(b) => NPVariant::from_bool(*b),
        ScriptValue::Int(i) => NPVariant::from_i32(*i),
        ScriptValue::Double(d) => NPVariant::from_f64(*d),
        ScriptValue::String(s) => {
            let chars = alloc_c_string(s);
            if chars.is_null() {
                return NPVariant::void();
            }
            NPVariant::from_npstring(NPString {
                utf8_characters: chars,
                utf8_length: s.len() as u32,
            })
        }
    }
}

/// Free what a variant owns and reset it to void.
///
/// # Safety
/// `variant` must be null or a valid variant whose string storage came from
/// the C allocator.
pub unsafe fn release_variant_value(variant: *mut NPVariant) {
    if variant.is_null() {
        return;
    }
    unsafe {
        match (*variant).variant_type {
            NPVARIANT_TYPE_STRING => {
                mem_free((*variant).value.string_value.utf8_characters as *mut c_void);
            }
            NPVARIANT_TYPE_OBJECT => release_object((*variant).value.object_value),
            _ => {}
        }
        *variant = NPVariant::void();
    }
}

/// Read the source text of a script string passed by a plugin.
///
/// # Safety
/// `script` must be null or point to a valid `NPString`.
pub unsafe fn npstring_to_string(script: *const NPString) -> Option<String> {
    unsafe {
        let script = script.as_ref()?;
        if script.utf8_characters.is_null() {
            return Some(String::new());
        }
        let bytes = std::slice::from_raw_parts(script.utf8_characters as *const u8, script.utf8_length as usize);
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Exceptions raised by plugins have nowhere to go but the log.
///
/// # Safety
/// `message` must be null or NUL-terminated.
pub unsafe fn set_exception(object: *mut NPObject, message: *const NPUTF8) {
    let text = if message.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
    };
    tracing::warn!("Plugin object {:p} raised: {}", object, text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DEALLOCATED: AtomicU32 = AtomicU32::new(0);

    unsafe extern "C" fn counting_deallocate(object: *mut NPObject) {
        DEALLOCATED.fetch_add(1, Ordering::SeqCst);
        unsafe { mem_free(object as *mut c_void) };
    }

    unsafe extern "C" fn answer(
        _object: *mut NPObject,
        _name: NPIdentifier,
        _args: *const NPVariant,
        _arg_count: u32,
        result: *mut NPVariant,
    ) -> bool {
        unsafe { *result = NPVariant::from_i32(42) };
        true
    }

    fn class() -> NPClass {
        NPClass {
            struct_version: NP_CLASS_STRUCT_VERSION,
            allocate: None,
            deallocate: Some(counting_deallocate),
            invalidate: None,
            has_method: None,
            invoke: Some(answer),
            invoke_default: None,
            has_property: None,
            get_property: None,
            set_property: None,
            remove_property: None,
            enumerate: None,
            construct: None,
        }
    }

    #[test]
    fn test_identifiers_are_interned() {
        let a = string_identifier(c"play");
        let b = string_identifier(c"play");
        let n = int_identifier(7);
        assert_eq!(a, b);
        assert_ne!(a, n);
        assert!(identifier_is_string(a));
        assert!(!identifier_is_string(n));
        assert_eq!(int_from_identifier(n), 7);

        let name = utf8_from_identifier(a);
        assert_eq!(unsafe { CStr::from_ptr(name) }.to_str().unwrap(), "play");
        unsafe { mem_free(name as *mut c_void) };
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        let mut bogus = 0u64;
        assert!(identifier(&mut bogus as *mut u64 as NPIdentifier).is_none());
        assert!(utf8_from_identifier(ptr::null_mut()).is_null());
    }

    #[test]
    fn test_object_refcount_and_dispatch() {
        let mut class = class();
        let before = DEALLOCATED.load(Ordering::SeqCst);
        unsafe {
            let object = create_object(ptr::null_mut(), &mut class);
            assert_eq!((*object).reference_count, 1);
            retain_object(object);
            assert_eq!((*object).reference_count, 2);

            let mut result = NPVariant::void();
            assert!(invoke(object, string_identifier(c"answer"), ptr::null(), 0, &mut result));
            assert_eq!(result.value.int_value, 42);
            assert!(!has_property(object, string_identifier(c"answer")));

            release_object(object);
            assert_eq!(DEALLOCATED.load(Ordering::SeqCst), before);
            release_object(object);
        }
        assert_eq!(DEALLOCATED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_string_variant_released() {
        let mut variant = variant_from_script_value(&ScriptValue::String("hello".into()));
        assert!(variant.is_string());
        let text = unsafe { npstring_to_string(&variant.value.string_value) };
        assert_eq!(text.as_deref(), Some("hello"));
        unsafe { release_variant_value(&mut variant) };
        assert_eq!(variant.variant_type, NPVARIANT_TYPE_VOID);
    }
}
