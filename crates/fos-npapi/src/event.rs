//! Windowless Events
//!
//! Input and paint requests are delivered to windowless plugins as a tagged
//! union. Coordinates are relative to the plugin element's top-left corner.

use std::ffi::c_void;

pub type NPEventType = u32;
pub const NP_MOUSE_EVENT: NPEventType = 1;
pub const NP_KEY_EVENT: NPEventType = 2;
pub const NP_FOCUS_EVENT: NPEventType = 3;
pub const NP_DRAW_EVENT: NPEventType = 4;
pub const NP_LIFECYCLE_EVENT: NPEventType = 5;
pub const NP_ORIENTATION_EVENT: NPEventType = 6;
pub const NP_FOREGROUND_EVENT: NPEventType = 7;
pub const NP_BACKGROUND_EVENT: NPEventType = 8;
pub const NP_WHEEL_EVENT: NPEventType = 9;
pub const NP_TOUCH_EVENT: NPEventType = 10;

// Mouse actions
pub const NP_MOUSE_DOWN: u32 = 0;
pub const NP_MOUSE_UP: u32 = 1;
pub const NP_MOUSE_MOVE: u32 = 2;
pub const NP_MOUSE_ENTER: u32 = 3;
pub const NP_MOUSE_LEAVE: u32 = 4;
pub const NP_MOUSE_CONTEXT_MENU: u32 = 5;

// Mouse buttons
pub const NP_BUTTON_NONE: u32 = 0;
pub const NP_BUTTON_LEFT: u32 = 1;
pub const NP_BUTTON_MIDDLE: u32 = 2;
pub const NP_BUTTON_RIGHT: u32 = 3;

// Key actions
pub const NP_KEY_DOWN: u32 = 0;
pub const NP_KEY_UP: u32 = 1;

// Modifier bits
pub const NP_MOD_SHIFT: u32 = 1 << 0;
pub const NP_MOD_CONTROL: u32 = 1 << 1;
pub const NP_MOD_ALT: u32 = 1 << 2;
pub const NP_MOD_META: u32 = 1 << 3;

// Lifecycle actions
pub const NP_LIFECYCLE_ON_LOAD: u32 = 0;
pub const NP_LIFECYCLE_ON_SCREEN: u32 = 1;
pub const NP_LIFECYCLE_OFF_SCREEN: u32 = 2;

// Touch actions
pub const NP_TOUCH_START: u32 = 0;
pub const NP_TOUCH_MOVE: u32 = 1;
pub const NP_TOUCH_END: u32 = 2;
pub const NP_TOUCH_CANCEL: u32 = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NPMouseEvent {
    pub action: u32,
    pub button: u32,
    pub x: i32,
    pub y: i32,
    pub modifiers: u32,
    pub click_count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NPKeyEvent {
    pub action: u32,
    pub key_code: u32,
    pub native_code: u32,
    pub unichar: u32,
    pub modifiers: u32,
    pub repeat: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NPFocusEvent {
    pub has_focus: u8,
}

/// Paint request. The host owns `pixels` for the duration of the call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NPDrawEvent {
    pub pixels: *mut c_void,
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    pub clip_left: i32,
    pub clip_top: i32,
    pub clip_right: i32,
    pub clip_bottom: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NPLifecycleEvent {
    pub action: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NPOrientationEvent {
    pub angle: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NPWheelEvent {
    pub x: i32,
    pub y: i32,
    pub delta_x: f32,
    pub delta_y: f32,
    pub modifiers: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NPTouchEvent {
    pub action: u32,
    pub x: i32,
    pub y: i32,
    pub identifier: i32,
    pub modifiers: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union NPEventData {
    pub mouse: NPMouseEvent,
    pub key: NPKeyEvent,
    pub focus: NPFocusEvent,
    pub draw: NPDrawEvent,
    pub lifecycle: NPLifecycleEvent,
    pub orientation: NPOrientationEvent,
    pub wheel: NPWheelEvent,
    pub touch: NPTouchEvent,
}

/// Event handed to a windowless plugin's `event` entry.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NPEvent {
    pub event_type: NPEventType,
    pub data: NPEventData,
}

impl NPEvent {
    pub fn mouse(mouse: NPMouseEvent) -> Self {
        Self { event_type: NP_MOUSE_EVENT, data: NPEventData { mouse } }
    }

    pub fn key(key: NPKeyEvent) -> Self {
        Self { event_type: NP_KEY_EVENT, data: NPEventData { key } }
    }

    pub fn focus(has_focus: bool) -> Self {
        Self {
            event_type: NP_FOCUS_EVENT,
            data: NPEventData { focus: NPFocusEvent { has_focus: has_focus as u8 } },
        }
    }

    pub fn draw(draw: NPDrawEvent) -> Self {
        Self { event_type: NP_DRAW_EVENT, data: NPEventData { draw } }
    }

    pub fn lifecycle(action: u32) -> Self {
        Self {
            event_type: NP_LIFECYCLE_EVENT,
            data: NPEventData { lifecycle: NPLifecycleEvent { action } },
        }
    }

    pub fn orientation(angle: i32) -> Self {
        Self {
            event_type: NP_ORIENTATION_EVENT,
            data: NPEventData { orientation: NPOrientationEvent { angle } },
        }
    }

    pub fn wheel(wheel: NPWheelEvent) -> Self {
        Self { event_type: NP_WHEEL_EVENT, data: NPEventData { wheel } }
    }

    pub fn touch(touch: NPTouchEvent) -> Self {
        Self { event_type: NP_TOUCH_EVENT, data: NPEventData { touch } }
    }

    /// Payload-free events such as foreground/background.
    pub fn bare(event_type: NPEventType) -> Self {
        Self {
            event_type,
            data: NPEventData { lifecycle: NPLifecycleEvent::default() },
        }
    }

    pub fn as_mouse(&self) -> Option<&NPMouseEvent> {
        // SAFETY: the tag selects the initialised member.
        (self.event_type == NP_MOUSE_EVENT).then(|| unsafe { &self.data.mouse })
    }

    pub fn as_key(&self) -> Option<&NPKeyEvent> {
        // SAFETY: as above.
        (self.event_type == NP_KEY_EVENT).then(|| unsafe { &self.data.key })
    }

    pub fn as_focus(&self) -> Option<&NPFocusEvent> {
        // SAFETY: as above.
        (self.event_type == NP_FOCUS_EVENT).then(|| unsafe { &self.data.focus })
    }

    pub fn as_draw(&self) -> Option<&NPDrawEvent> {
        // SAFETY: as above.
        (self.event_type == NP_DRAW_EVENT).then(|| unsafe { &self.data.draw })
    }

    pub fn as_lifecycle(&self) -> Option<&NPLifecycleEvent> {
        // SAFETY: as above.
        (self.event_type == NP_LIFECYCLE_EVENT).then(|| unsafe { &self.data.lifecycle })
    }

    pub fn as_orientation(&self) -> Option<&NPOrientationEvent> {
        // SAFETY: as above.
        (self.event_type == NP_ORIENTATION_EVENT).then(|| unsafe { &self.data.orientation })
    }
}

impl std::fmt::Debug for NPEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = self.as_mouse() {
            return write!(f, "NPEvent::Mouse({:?})", m);
        }
        if let Some(k) = self.as_key() {
            return write!(f, "NPEvent::Key({:?})", k);
        }
        if let Some(focus) = self.as_focus() {
            return write!(f, "NPEvent::Focus({})", focus.has_focus != 0);
        }
        if let Some(d) = self.as_draw() {
            return write!(f, "NPEvent::Draw({}x{})", d.width, d.height);
        }
        write!(f, "NPEvent({})", self.event_type)
    }
}
