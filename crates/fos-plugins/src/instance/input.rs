//! Input delivery
//!
//! Windowless instances get host input translated into plugin events.
//! Windowed instances get native window messages, subject to the quirks of
//! plugins that misbehave under message floods or recursion.

use std::ffi::c_void;
use std::rc::Rc;

use fos_npapi::*;

use super::{LifecycleState, PluginView};
use crate::events::PluginInputEvent;
use crate::quirks::QuirkSet;
use crate::surface::NativeSurface;
use crate::throttler::{MessageThrottler, NativeMessage, WM_USER};

impl PluginView {
    /// Deliver host input. Returns whether the plugin consumed it.
    pub fn handle_event(&self, event: PluginInputEvent) -> bool {
        if self.state.get() == LifecycleState::Halted {
            if event.is_mouse_down() {
                return self.restart();
            }
            return false;
        }
        if !self.is_started() || self.is_windowed.get() {
            return false;
        }

        if event.is_right_button() && self.quirks.has(QuirkSet::IGNORE_RIGHT_CLICK_IN_WINDOWLESS_MODE) {
            return false;
        }

        let _protect = self.self_ref.upgrade();
        if event.is_mouse_down() && !self.has_focus.get() {
            self.set_focus(true);
        }
        if let PluginInputEvent::Focus(focused) = event {
            self.has_focus.set(focused);
        }

        // Plugins predating the popup-state API get the gesture implicitly.
        let implicit_popups = event.is_user_gesture() && self.plugin_minor_version() < NPVERS_HAS_POPUPS_ENABLED_STATE;
        if implicit_popups {
            self.push_popups_enabled_state(true);
        }

        let mut np_event = event.to_np_event(self.frame_rect.get().location());
        let handled = self.dispatch_np_event(&mut np_event);

        if implicit_popups {
            self.schedule_popup_pop();
        }

        matches!(event, PluginInputEvent::ContextMenu(_)) || handled
    }

    /// Pop the implicit popup state once the current turn is over.
    fn schedule_popup_pop(&self) {
        let weak = self.weak();
        self.scheduler.post(move || {
            if let Some(view) = weak.upgrade() {
                view.pop_popups_enabled_state();
            }
        });
    }

    pub(super) fn dispatch_np_event(&self, event: &mut NPEvent) -> bool {
        let event: *mut NPEvent = event;
        self.with_plugin_call(|funcs, npp| match funcs.event {
            // SAFETY: the event outlives the call.
            Some(handle_event) => unsafe { handle_event(npp, event as *mut c_void) != 0 },
            None => false,
        })
        .unwrap_or(false)
    }

    pub fn has_focus(&self) -> bool {
        self.has_focus.get()
    }

    pub fn set_focus(&self, focused: bool) {
        if !self.is_started() {
            return;
        }
        self.has_focus.set(focused);
        if self.is_windowed.get() {
            return;
        }
        let mut event = NPEvent::focus(focused);
        self.dispatch_np_event(&mut event);
    }

    /// Tell a windowless instance its page went to the foreground or background.
    pub fn set_foreground(&self, foreground: bool) {
        if !self.is_started() || self.is_windowed.get() {
            return;
        }
        let mut event = NPEvent::bare(if foreground { NP_FOREGROUND_EVENT } else { NP_BACKGROUND_EVENT });
        self.dispatch_np_event(&mut event);
    }

    pub fn set_on_screen(&self, on_screen: bool) {
        if !self.is_started() || self.is_windowed.get() {
            return;
        }
        let mut event = NPEvent::lifecycle(if on_screen { NP_LIFECYCLE_ON_SCREEN } else { NP_LIFECYCLE_OFF_SCREEN });
        self.dispatch_np_event(&mut event);
    }

    pub fn set_orientation(&self, angle: i32) {
        if !self.is_started() || self.is_windowed.get() {
            return;
        }
        let mut event = NPEvent::orientation(angle);
        self.dispatch_np_event(&mut event);
    }

    /// Deliver a message sent to a windowed instance's native window.
    pub fn handle_native_message(&self, message: NativeMessage) -> bool {
        if !self.is_started() || !self.is_windowed.get() {
            return false;
        }

        if self.quirks.has(QuirkSet::DONT_CALL_WND_PROC_FOR_SAME_MESSAGE_RECURSIVELY)
            && self.current_native_message.get() == Some(message.message)
        {
            tracing::debug!("Dropping recursive message {:#x}", message.message);
            return false;
        }

        if self.quirks.has(QuirkSet::THROTTLE_USER_PLUS_ONE_MESSAGES) && message.message == WM_USER + 1 {
            self.message_throttler().append_message(message);
            return true;
        }

        self.dispatch_native_message(message)
    }

    fn message_throttler(&self) -> Rc<MessageThrottler> {
        if let Some(throttler) = self.throttler.borrow().as_ref() {
            return throttler.clone();
        }
        let weak = self.weak();
        let throttler = MessageThrottler::with_intervals(
            self.scheduler.clone(),
            self.settings.message_throttle_interval(),
            self.settings.direct_message_interval(),
            move |message| {
                if let Some(view) = weak.upgrade() {
                    view.dispatch_native_message(message);
                }
            },
        );
        *self.throttler.borrow_mut() = Some(throttler.clone());
        throttler
    }

    pub fn queued_native_messages(&self) -> usize {
        self.throttler.borrow().as_ref().map_or(0, |t| t.queued())
    }

    fn dispatch_native_message(&self, message: NativeMessage) -> bool {
        let Some(window) = self.surface.borrow().as_ref().and_then(NativeSurface::window) else {
            return false;
        };
        let _protect = self.self_ref.upgrade();
        let previous = self.current_native_message.replace(Some(message.message));
        let handled = self
            .with_plugin_call(|_, _| window.dispatch_message(message.message, message.wparam, message.lparam))
            .unwrap_or(false);
        self.current_native_message.set(previous);
        handled
    }
}
