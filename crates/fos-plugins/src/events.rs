//! Windowless input translation
//!
//! Classified host input arrives in document coordinates and is converted
//! into the plugin event union with coordinates relative to the element.

use fos_npapi::*;

use crate::geometry::IntPoint;

/// Mouse event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventType {
    MouseDown,
    MouseUp,
    MouseMove,
    MouseEnter,
    MouseLeave,
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    /// Primary button (usually left)
    Primary,
    /// Auxiliary button (usually middle/wheel)
    Auxiliary,
    /// Secondary button (usually right)
    Secondary,
    /// No button
    None,
}

impl MouseButton {
    fn to_np(self) -> u32 {
        match self {
            MouseButton::Primary => NP_BUTTON_LEFT,
            MouseButton::Auxiliary => NP_BUTTON_MIDDLE,
            MouseButton::Secondary => NP_BUTTON_RIGHT,
            MouseButton::None => NP_BUTTON_NONE,
        }
    }
}

/// Keyboard modifier state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift_key: bool,
    pub ctrl_key: bool,
    pub alt_key: bool,
    pub meta_key: bool,
}

impl Modifiers {
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.shift_key {
            bits |= NP_MOD_SHIFT;
        }
        if self.ctrl_key {
            bits |= NP_MOD_CONTROL;
        }
        if self.alt_key {
            bits |= NP_MOD_ALT;
        }
        if self.meta_key {
            bits |= NP_MOD_META;
        }
        bits
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseInput {
    pub event_type: MouseEventType,
    pub button: MouseButton,
    /// Document coordinates
    pub position: IntPoint,
    pub modifiers: Modifiers,
    pub click_count: u32,
}

impl MouseInput {
    pub fn new(event_type: MouseEventType, button: MouseButton, position: IntPoint) -> Self {
        Self {
            event_type,
            button,
            position,
            modifiers: Modifiers::default(),
            click_count: if event_type == MouseEventType::MouseDown { 1 } else { 0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventType {
    KeyDown,
    KeyUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub event_type: KeyEventType,
    /// Virtual key code
    pub key_code: u32,
    /// Platform scan code
    pub native_code: u32,
    /// Character produced, if any
    pub unichar: u32,
    pub modifiers: Modifiers,
    pub repeat: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelInput {
    pub position: IntPoint,
    pub delta_x: f32,
    pub delta_y: f32,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEventType {
    TouchStart,
    TouchMove,
    TouchEnd,
    TouchCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchInput {
    pub event_type: TouchEventType,
    pub position: IntPoint,
    pub identifier: i32,
    pub modifiers: Modifiers,
}

/// Input routed to a windowless plugin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PluginInputEvent {
    Mouse(MouseInput),
    Key(KeyInput),
    Focus(bool),
    Wheel(WheelInput),
    Touch(TouchInput),
    /// Context menu request at a document position
    ContextMenu(IntPoint),
}

impl PluginInputEvent {
    /// Events that count as a user gesture for popup permission.
    pub fn is_user_gesture(&self) -> bool {
        match self {
            PluginInputEvent::Mouse(m) => {
                matches!(m.event_type, MouseEventType::MouseDown | MouseEventType::MouseUp)
            }
            PluginInputEvent::Key(_) => true,
            PluginInputEvent::Touch(t) => {
                matches!(t.event_type, TouchEventType::TouchStart | TouchEventType::TouchEnd)
            }
            PluginInputEvent::ContextMenu(_) => true,
            PluginInputEvent::Focus(_) | PluginInputEvent::Wheel(_) => false,
        }
    }

    pub fn is_right_button(&self) -> bool {
        matches!(self, PluginInputEvent::Mouse(m) if m.button == MouseButton::Secondary)
    }

    pub fn is_mouse_down(&self) -> bool {
        matches!(self, PluginInputEvent::Mouse(m) if m.event_type == MouseEventType::MouseDown)
    }

    /// Build the wire event; `origin` is the element's top-left corner in
    /// document coordinates.
    pub fn to_np_event(&self, origin: IntPoint) -> NPEvent {
        let local = |p: IntPoint| (p.x - origin.x, p.y - origin.y);
        match *self {
            PluginInputEvent::Mouse(m) => {
                let (x, y) = local(m.position);
                NPEvent::mouse(NPMouseEvent {
                    action: match m.event_type {
                        MouseEventType::MouseDown => NP_MOUSE_DOWN,
                        MouseEventType::MouseUp => NP_MOUSE_UP,
                        MouseEventType::MouseMove => NP_MOUSE_MOVE,
                        MouseEventType::MouseEnter => NP_MOUSE_ENTER,
                        MouseEventType::MouseLeave => NP_MOUSE_LEAVE,
                    },
                    button: m.button.to_np(),
                    x,
                    y,
                    modifiers: m.modifiers.bits(),
                    click_count: m.click_count,
                })
            }
            PluginInputEvent::Key(k) => NPEvent::key(NPKeyEvent {
                action: match k.event_type {
                    KeyEventType::KeyDown => NP_KEY_DOWN,
                    KeyEventType::KeyUp => NP_KEY_UP,
                },
                key_code: k.key_code,
                native_code: k.native_code,
                unichar: k.unichar,
                modifiers: k.modifiers.bits(),
                repeat: k.repeat as u32,
            }),
            PluginInputEvent::Focus(has_focus) => NPEvent::focus(has_focus),
            PluginInputEvent::Wheel(w) => {
                let (x, y) = local(w.position);
                NPEvent::wheel(NPWheelEvent {
                    x,
                    y,
                    delta_x: w.delta_x,
                    delta_y: w.delta_y,
                    modifiers: w.modifiers.bits(),
                })
            }
            PluginInputEvent::Touch(t) => {
                let (x, y) = local(t.position);
                NPEvent::touch(NPTouchEvent {
                    action: match t.event_type {
                        TouchEventType::TouchStart => NP_TOUCH_START,
                        TouchEventType::TouchMove => NP_TOUCH_MOVE,
                        TouchEventType::TouchEnd => NP_TOUCH_END,
                        TouchEventType::TouchCancel => NP_TOUCH_CANCEL,
                    },
                    x,
                    y,
                    identifier: t.identifier,
                    modifiers: t.modifiers.bits(),
                })
            }
            PluginInputEvent::ContextMenu(position) => {
                let (x, y) = local(position);
                NPEvent::mouse(NPMouseEvent {
                    action: NP_MOUSE_CONTEXT_MENU,
                    button: NP_BUTTON_RIGHT,
                    x,
                    y,
                    ..Default::default()
                })
            }
        }
    }
}
