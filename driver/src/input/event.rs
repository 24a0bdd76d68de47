//! Input event payloads
//!
//! [`InputEvent`] is what the harness sends; [`DeviceEvent`] is the validated,
//! keycode-resolved form that is queued on a device and posted to the server.

use serde::{Deserialize, Serialize};

use super::keymap::KeyId;
use super::Axis;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

impl ScrollAxis {
    pub fn axis(self) -> Axis {
        match self {
            ScrollAxis::Vertical => Axis::ScrollVertical,
            ScrollAxis::Horizontal => Axis::ScrollHorizontal,
        }
    }
}

/// Event as requested by the harness
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InputEvent {
    Key { key: KeyId, pressed: bool },
    Button { button: u32, pressed: bool },
    Motion { dx: i32, dy: i32 },
    MotionAbsolute { x: i32, y: i32 },
    Scroll { axis: ScrollAxis, delta: f64 },
}

impl InputEvent {
    pub fn key(key: impl Into<KeyId>, pressed: bool) -> Self {
        InputEvent::Key {
            key: key.into(),
            pressed,
        }
    }

    pub fn button(button: u32, pressed: bool) -> Self {
        InputEvent::Button { button, pressed }
    }
}

/// Event accepted for a device, in the form the server receives it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeviceEvent {
    Key { keycode: u32, pressed: bool },
    Button { button: u32, pressed: bool },
    Motion { dx: i32, dy: i32 },
    MotionAbsolute { x: u32, y: u32 },
    Scroll { axis: ScrollAxis, delta: f64 },
}
