//! Host services offered to a running instance
//!
//! Values, invalidation, status text, the user agent, cookies, timers, async
//! calls, popup state and script evaluation.

use std::ffi::{CString, c_char, c_void};
use std::ptr;
use std::time::Duration;

use fos_npapi::*;

use super::PluginView;
use crate::error::{NpError, NpResult};
use crate::geometry::IntRect;
use crate::host::ScriptValue;
use crate::quirks::QuirkSet;
use crate::scheduler::TaskId;
use crate::scripting;

/// GTK2, the toolkit XEmbed plugins expect.
const TOOLKIT_GTK2: u32 = 2;

/// A timer the plugin scheduled.
pub(super) struct Timer {
    task: TaskId,
    interval: Duration,
    repeat: bool,
    func: unsafe extern "C" fn(NPP, u32),
}

/// Answer value queries that do not depend on an instance.
///
/// # Safety
/// `value` must point to storage of the type the variable calls for.
pub(crate) unsafe fn get_static_value(variable: NPNVariable, value: *mut c_void) -> NpResult {
    if value.is_null() {
        return Err(NpError::InvalidParam);
    }
    unsafe {
        match variable {
            NPNV_TOOLKIT => *(value as *mut u32) = TOOLKIT_GTK2,
            NPNV_SUPPORTS_XEMBED_BOOL | NPNV_SUPPORTS_WINDOWLESS => *(value as *mut NPBool) = 1,
            NPNV_JAVASCRIPT_ENABLED_BOOL => *(value as *mut NPBool) = 1,
            NPNV_IS_OFFLINE_BOOL => *(value as *mut NPBool) = 0,
            _ => return Err(NpError::Generic),
        }
    }
    Ok(())
}

impl PluginView {
    /// Answer a value query from the plugin.
    ///
    /// # Safety
    /// `value` must point to storage of the type the variable calls for.
    pub unsafe fn get_value(&self, variable: NPNVariable, value: *mut c_void) -> NpResult {
        if value.is_null() {
            return Err(NpError::InvalidParam);
        }
        unsafe {
            match variable {
                NPNV_JAVASCRIPT_ENABLED_BOOL => {
                    let enabled = self.settings.scripting_enabled && self.frame.can_execute_scripts();
                    *(value as *mut NPBool) = enabled as NPBool;
                }
                NPNV_PRIVATE_MODE_BOOL => {
                    let private = self.settings.private_browsing || self.frame.is_private_browsing();
                    *(value as *mut NPBool) = private as NPBool;
                }
                NPNV_NETSCAPE_WINDOW => {
                    *(value as *mut *mut c_void) = self.frame.parent_window_handle();
                }
                NPNV_WINDOW_NPOBJECT | NPNV_PLUGIN_ELEMENT_NPOBJECT => {
                    if !self.settings.scripting_enabled {
                        return Err(NpError::Generic);
                    }
                    let object = if variable == NPNV_WINDOW_NPOBJECT {
                        self.frame.window_script_object()
                    } else {
                        self.frame.plugin_element_object()
                    };
                    if object.is_null() {
                        return Err(NpError::Generic);
                    }
                    // The plugin owns the reference it is handed.
                    *(value as *mut *mut NPObject) = scripting::retain_object(object);
                }
                _ => return get_static_value(variable, value),
            }
        }
        Ok(())
    }

    /// Accept a setting from the plugin. Only drawing-mode flags are
    /// understood.
    pub fn set_value(&self, variable: NPPVariable, value: *mut c_void) -> NpResult {
        match variable {
            NPPV_PLUGIN_WINDOW_BOOL => {
                self.is_windowed.set(!value.is_null());
                Ok(())
            }
            NPPV_PLUGIN_TRANSPARENT_BOOL => {
                self.is_transparent.set(!value.is_null());
                Ok(())
            }
            _ => Err(NpError::Generic),
        }
    }

    // ------------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------------

    /// Repaint part of a windowless instance; `rect` is element-local.
    pub fn invalidate_rect(&self, rect: NPRect) {
        if self.is_windowed.get() {
            return;
        }
        let origin = self.frame_rect.get().location();
        let dirty = IntRect::from_np_rect(&rect).translated(origin.x, origin.y);
        if dirty.is_empty() {
            return;
        }

        if !self.quirks.has(QuirkSet::THROTTLE_INVALIDATE) {
            self.frame.invalidate_rect(dirty);
            return;
        }

        self.pending_invalidations.borrow_mut().push(dirty);
        if self.invalidate_task.get().is_none() {
            let weak = self.weak();
            let task = self
                .scheduler
                .post_delayed(self.settings.invalidate_throttle_interval(), move || {
                    if let Some(view) = weak.upgrade() {
                        view.invalidate_task.set(None);
                        view.flush_invalidations();
                    }
                });
            self.invalidate_task.set(Some(task));
        }
    }

    pub fn invalidate_region(&self, _region: NPRegion) {
        if self.is_windowed.get() {
            return;
        }
        self.frame.invalidate_rect(self.frame_rect.get());
    }

    pub fn force_redraw(&self) {
        if let Some(task) = self.invalidate_task.take() {
            self.scheduler.cancel(task);
        }
        self.pending_invalidations.borrow_mut().clear();
        self.frame.invalidate_rect(self.frame_rect.get());
    }

    fn flush_invalidations(&self) {
        let pending = std::mem::take(&mut *self.pending_invalidations.borrow_mut());
        for rect in pending {
            self.frame.invalidate_rect(rect);
        }
    }

    // ------------------------------------------------------------------------
    // Identity and environment
    // ------------------------------------------------------------------------

    pub fn set_status_text(&self, text: &str) {
        self.frame.set_status_text(text);
    }

    /// User agent handed to the plugin. Valid until the next call.
    pub fn user_agent(&self) -> *const c_char {
        let agent = if self.quirks.has(QuirkSet::WANTS_MOZILLA_USER_AGENT) {
            self.settings.mozilla_user_agent.clone()
        } else {
            self.frame.user_agent().unwrap_or_else(|| self.settings.user_agent.clone())
        };

        let mut cached = self.user_agent.borrow_mut();
        if cached.as_ref().map(|c| c.as_bytes()) != Some(agent.as_bytes()) {
            *cached = CString::new(agent).ok();
        }
        cached.as_ref().map_or(ptr::null(), |c| c.as_ptr())
    }

    /// Cookie or proxy setting for a URL.
    pub fn value_for_url(&self, variable: NPNURLVariable, url: &str) -> NpResult<Option<String>> {
        match variable {
            NPNURLV_COOKIE => {
                let url = self.frame.base_url().join(url).map_err(|_| NpError::InvalidUrl)?;
                Ok(self.frame.cookies(&url))
            }
            NPNURLV_PROXY => Ok(Some("DIRECT".to_string())),
            _ => Err(NpError::Generic),
        }
    }

    pub fn set_value_for_url(&self, variable: NPNURLVariable, url: &str, value: &str) -> NpResult {
        match variable {
            NPNURLV_COOKIE => {
                let url = self.frame.base_url().join(url).map_err(|_| NpError::InvalidUrl)?;
                self.frame.set_cookies(&url, value);
                Ok(())
            }
            _ => Err(NpError::Generic),
        }
    }

    // ------------------------------------------------------------------------
    // Timers and async calls
    // ------------------------------------------------------------------------

    /// Returns the timer id, or 0 when the instance is not running.
    pub fn schedule_timer(&self, interval_ms: u32, repeat: bool, func: unsafe extern "C" fn(NPP, u32)) -> u32 {
        if !self.is_started() {
            return 0;
        }
        let id = self.next_timer_id.get();
        self.next_timer_id.set(id.wrapping_add(1).max(1));
        self.arm_timer(id, Duration::from_millis(interval_ms as u64), repeat, func);
        id
    }

    fn arm_timer(&self, id: u32, interval: Duration, repeat: bool, func: unsafe extern "C" fn(NPP, u32)) {
        let weak = self.weak();
        let task = self.scheduler.post_delayed(interval, move || {
            if let Some(view) = weak.upgrade() {
                view.timer_fired(id);
            }
        });
        self.timers.borrow_mut().insert(id, Timer { task, interval, repeat, func });
    }

    fn timer_fired(&self, id: u32) {
        let Some(timer) = self.timers.borrow_mut().remove(&id) else {
            return;
        };
        // Re-arm first so the callback can unschedule it.
        if timer.repeat {
            self.arm_timer(id, timer.interval, true, timer.func);
        }
        let func = timer.func;
        self.with_plugin_call(|_, npp| {
            // SAFETY: the plugin registered this callback for this instance.
            unsafe { func(npp, id) }
        });
    }

    pub fn unschedule_timer(&self, id: u32) {
        let timer = self.timers.borrow_mut().remove(&id);
        if let Some(timer) = timer {
            self.scheduler.cancel(timer.task);
        }
    }

    pub fn active_timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Run `func(data)` on a later turn, unless the instance stops first.
    pub fn plugin_thread_async_call(&self, func: unsafe extern "C" fn(*mut c_void), data: *mut c_void) -> NpResult {
        self.ensure_started()?;
        let weak = self.weak();
        let task = self.scheduler.post(move || {
            let Some(view) = weak.upgrade() else {
                return;
            };
            view.async_calls
                .borrow_mut()
                .retain(|task| view.scheduler.is_pending(*task));
            view.with_plugin_call(|_, _| {
                // SAFETY: the plugin handed over the callback and its data.
                unsafe { func(data) }
            });
        });
        self.async_calls.borrow_mut().push(task);
        Ok(())
    }

    /// Cancel everything the plugin scheduled on the host.
    pub(super) fn cancel_services(&self) {
        let timers: Vec<Timer> = self.timers.borrow_mut().drain().map(|(_, t)| t).collect();
        for timer in timers {
            self.scheduler.cancel(timer.task);
        }
        let calls: Vec<TaskId> = self.async_calls.borrow_mut().drain(..).collect();
        for task in calls {
            self.scheduler.cancel(task);
        }
        if let Some(task) = self.invalidate_task.take() {
            self.scheduler.cancel(task);
        }
        self.pending_invalidations.borrow_mut().clear();
    }

    // ------------------------------------------------------------------------
    // Popups and script
    // ------------------------------------------------------------------------

    pub fn push_popups_enabled_state(&self, enabled: bool) {
        self.popup_states.push(enabled);
    }

    pub fn pop_popups_enabled_state(&self) {
        self.popup_states.pop();
    }

    pub fn are_popups_allowed(&self) -> bool {
        self.popup_states.are_popups_allowed()
    }

    /// Run script for the plugin. `None` when scripting is off.
    pub fn evaluate(&self, script: &str) -> Option<ScriptValue> {
        if !self.settings.scripting_enabled || !self.frame.can_execute_scripts() {
            return None;
        }
        let _protect = self.self_ref.upgrade();
        Some(self.frame.execute_script(script, self.popup_states.are_popups_allowed()))
    }
}
