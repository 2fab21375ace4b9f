//! Plugin call context
//!
//! Native code can call back into the host before the call that entered it
//! returns. Each thread keeps a stack of the instances currently inside a
//! plugin call, so a callback carrying a null instance handle still resolves
//! to the right view, and a count of calls into modules that run their own
//! modal message loops.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use fos_npapi::NPP;

use crate::instance::PluginView;

/// Interpreter lock of the host script engine.
///
/// Released for the duration of every plugin call so a plugin evaluating
/// script from inside the call cannot deadlock.
pub trait ScriptLock {
    /// Drop every level held by this thread; returns the depth to restore.
    fn release_all(&self) -> u32;

    fn reacquire(&self, depth: u32);
}

/// Host without an interpreter lock
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScriptLock;

impl ScriptLock for NoScriptLock {
    fn release_all(&self) -> u32 {
        0
    }

    fn reacquire(&self, _depth: u32) {}
}

thread_local! {
    static CALL_STACK: RefCell<Vec<Weak<PluginView>>> = const { RefCell::new(Vec::new()) };
    static CALLING_PLUGIN: Cell<u32> = const { Cell::new(0) };
    static INSTANCES: RefCell<HashMap<usize, Weak<PluginView>>> = RefCell::new(HashMap::new());
}

/// Scope of one call into plugin code.
///
/// Restores the call stack, the calling-plugin count and the script lock when
/// dropped, including during unwinding.
pub struct PluginCallScope<'a> {
    lock: &'a dyn ScriptLock,
    lock_depth: u32,
    counts_as_calling: bool,
}

impl<'a> PluginCallScope<'a> {
    pub fn enter(view: Weak<PluginView>, lock: &'a dyn ScriptLock, modal_message_loop: bool) -> Self {
        CALL_STACK.with(|stack| stack.borrow_mut().push(view));
        if modal_message_loop {
            CALLING_PLUGIN.with(|count| count.set(count.get() + 1));
        }
        let lock_depth = lock.release_all();
        Self {
            lock,
            lock_depth,
            counts_as_calling: modal_message_loop,
        }
    }
}

impl Drop for PluginCallScope<'_> {
    fn drop(&mut self) {
        self.lock.reacquire(self.lock_depth);
        if self.counts_as_calling {
            CALLING_PLUGIN.with(|count| count.set(count.get().saturating_sub(1)));
        }
        CALL_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Instance whose plugin call is innermost on this thread.
pub fn current_instance() -> Option<Rc<PluginView>> {
    CALL_STACK.with(|stack| stack.borrow().last().and_then(Weak::upgrade))
}

/// Depth of plugin call nesting on this thread.
pub fn call_depth() -> usize {
    CALL_STACK.with(|stack| stack.borrow().len())
}

/// Whether a module with a modal message loop is currently being called.
///
/// Views defer paints while this holds. Embedders should also drop native
/// messages for their own windows, since the module may be pumping them.
pub fn is_calling_plugin() -> bool {
    calling_plugin_count() > 0
}

pub fn calling_plugin_count() -> u32 {
    CALLING_PLUGIN.with(Cell::get)
}

pub(crate) fn register_instance(npp: NPP, view: Weak<PluginView>) {
    INSTANCES.with(|map| map.borrow_mut().insert(npp as usize, view));
}

pub(crate) fn unregister_instance(npp: NPP) {
    // Ignore access after thread-local teardown.
    let _ = INSTANCES.try_with(|map| map.borrow_mut().remove(&(npp as usize)));
}

/// Resolve an instance handle passed by a plugin. A null handle means the
/// instance currently inside a plugin call.
pub(crate) fn instance_for(npp: NPP) -> Option<Rc<PluginView>> {
    if npp.is_null() {
        return current_instance();
    }
    INSTANCES.with(|map| map.borrow().get(&(npp as usize)).and_then(Weak::upgrade))
}
