//! Key naming
//!
//! Keys reach the server as X keycodes, which are evdev scancodes offset by 8.
//! The harness may use either the raw keycode or the keysym name of the key in
//! a US layout.

use serde::{Deserialize, Serialize};

/// Lowest and highest keycodes the X protocol can carry
pub const MIN_KEYCODE: u32 = 8;
pub const MAX_KEYCODE: u32 = 255;

/// Offset from evdev scancode to X keycode
const EVDEV_OFFSET: u32 = 8;

/// Keysym name -> evdev scancode
const EVDEV_NAMES: &[(&str, u32)] = &[
    ("Escape", 1),
    ("1", 2),
    ("2", 3),
    ("3", 4),
    ("4", 5),
    ("5", 6),
    ("6", 7),
    ("7", 8),
    ("8", 9),
    ("9", 10),
    ("0", 11),
    ("minus", 12),
    ("equal", 13),
    ("BackSpace", 14),
    ("Tab", 15),
    ("q", 16),
    ("w", 17),
    ("e", 18),
    ("r", 19),
    ("t", 20),
    ("y", 21),
    ("u", 22),
    ("i", 23),
    ("o", 24),
    ("p", 25),
    ("bracketleft", 26),
    ("bracketright", 27),
    ("Return", 28),
    ("Control_L", 29),
    ("a", 30),
    ("s", 31),
    ("d", 32),
    ("f", 33),
    ("g", 34),
    ("h", 35),
    ("j", 36),
    ("k", 37),
    ("l", 38),
    ("semicolon", 39),
    ("apostrophe", 40),
    ("grave", 41),
    ("Shift_L", 42),
    ("backslash", 43),
    ("z", 44),
    ("x", 45),
    ("c", 46),
    ("v", 47),
    ("b", 48),
    ("n", 49),
    ("m", 50),
    ("comma", 51),
    ("period", 52),
    ("slash", 53),
    ("Shift_R", 54),
    ("KP_Multiply", 55),
    ("Alt_L", 56),
    ("space", 57),
    ("Caps_Lock", 58),
    ("F1", 59),
    ("F2", 60),
    ("F3", 61),
    ("F4", 62),
    ("F5", 63),
    ("F6", 64),
    ("F7", 65),
    ("F8", 66),
    ("F9", 67),
    ("F10", 68),
    ("Num_Lock", 69),
    ("Scroll_Lock", 70),
    ("F11", 87),
    ("F12", 88),
    ("Control_R", 97),
    ("Alt_R", 100),
    ("Home", 102),
    ("Up", 103),
    ("Prior", 104),
    ("Left", 105),
    ("Right", 106),
    ("End", 107),
    ("Down", 108),
    ("Next", 109),
    ("Insert", 110),
    ("Delete", 111),
    ("Super_L", 125),
    ("Super_R", 126),
    ("Menu", 127),
];

/// Key identifier: either an X keycode or a keysym name
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyId {
    Keycode(u32),
    Named(String),
}

impl KeyId {
    /// Resolve to an X keycode.
    ///
    /// Names are matched exactly first; a single ASCII letter also matches its
    /// other case so "A" and "a" address the same key.
    pub fn to_keycode(&self) -> Option<u32> {
        match self {
            KeyId::Keycode(code) => Some(*code),
            KeyId::Named(name) => keycode_for_name(name),
        }
    }
}

impl From<u32> for KeyId {
    fn from(code: u32) -> Self {
        KeyId::Keycode(code)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        KeyId::Named(name.to_string())
    }
}

pub fn keycode_for_name(name: &str) -> Option<u32> {
    let lookup = |wanted: &str| {
        EVDEV_NAMES
            .iter()
            .find(|(n, _)| *n == wanted)
            .map(|(_, code)| code + EVDEV_OFFSET)
    };
    lookup(name).or_else(|| {
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => {
                lookup(&c.to_ascii_lowercase().to_string())
            }
            _ => None,
        }
    })
}

pub fn name_for_keycode(keycode: u32) -> Option<&'static str> {
    let scancode = keycode.checked_sub(EVDEV_OFFSET)?;
    EVDEV_NAMES
        .iter()
        .find(|(_, code)| *code == scancode)
        .map(|(name, _)| *name)
}
