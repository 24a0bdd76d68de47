//! Synthetic devices and their capability sets

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::event::{DeviceEvent, InputEvent};
use super::keymap::{KeyId, MAX_KEYCODE, MIN_KEYCODE};
use crate::error::{DriverError, Result};
use crate::host::HostDeviceHandle;

/// Accepted events kept per device for state dumps
const HISTORY_SIZE: usize = 32;

/// Highest button number the server accepts
pub const MAX_BUTTON: u32 = 255;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Keyboard,
    Pointer,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Axis {
    RelX,
    RelY,
    AbsX,
    AbsY,
    ScrollVertical,
    ScrollHorizontal,
}

/// Capabilities as declared by the harness
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    #[serde(default)]
    pub keys: Vec<KeyId>,
    #[serde(default)]
    pub buttons: Vec<u32>,
    #[serde(default)]
    pub axes: Vec<Axis>,
}

impl Capabilities {
    pub fn keys<K: Into<KeyId>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Resolved capabilities, as registered with the server
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    pub keys: BTreeSet<u32>,
    pub buttons: BTreeSet<u32>,
    pub axes: BTreeSet<Axis>,
}

impl CapabilitySet {
    /// Resolve key names and check the set fits the device kind.
    pub fn resolve(kind: DeviceKind, declared: &Capabilities) -> Result<Self> {
        let reject = |msg: String| Err(DriverError::DeviceRegistrationFailed(msg));

        let mut keys = BTreeSet::new();
        for key in &declared.keys {
            match key.to_keycode() {
                Some(code) if (MIN_KEYCODE..=MAX_KEYCODE).contains(&code) => {
                    keys.insert(code);
                }
                Some(code) => {
                    return reject(format!(
                        "keycode {} outside {}..={}",
                        code, MIN_KEYCODE, MAX_KEYCODE
                    ))
                }
                None => return reject(format!("unknown key {:?}", key)),
            }
        }
        if let Some(button) = declared
            .buttons
            .iter()
            .find(|b| !(1..=MAX_BUTTON).contains(*b))
        {
            return reject(format!("button {} outside 1..={}", button, MAX_BUTTON));
        }

        let set = Self {
            keys,
            buttons: declared.buttons.iter().copied().collect(),
            axes: declared.axes.iter().copied().collect(),
        };

        match kind {
            DeviceKind::Keyboard if set.keys.is_empty() => {
                reject("keyboard declares no keys".into())
            }
            DeviceKind::Keyboard if !set.buttons.is_empty() || !set.axes.is_empty() => {
                reject("keyboard may only declare keys".into())
            }
            DeviceKind::Pointer if set.buttons.is_empty() && set.axes.is_empty() => {
                reject("pointer declares no buttons or axes".into())
            }
            DeviceKind::Pointer if !set.keys.is_empty() => {
                reject("pointer may not declare keys".into())
            }
            _ => Ok(set),
        }
    }

    /// What a configured device of this kind gets by default
    pub fn default_for(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Keyboard => Self {
                keys: (MIN_KEYCODE..=MAX_KEYCODE).collect(),
                ..Self::default()
            },
            DeviceKind::Pointer => Self {
                buttons: (1..=9).collect(),
                axes: [
                    Axis::RelX,
                    Axis::RelY,
                    Axis::AbsX,
                    Axis::AbsY,
                    Axis::ScrollVertical,
                    Axis::ScrollHorizontal,
                ]
                .into_iter()
                .collect(),
                ..Self::default()
            },
        }
    }
}

/// An event the server accepted, kept for inspection
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct AcceptedEvent {
    pub serial: u64,
    pub event: DeviceEvent,
}

/// Summary sent to the harness by `list-devices`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    pub keys: usize,
    pub buttons: Vec<u32>,
    pub axes: Vec<Axis>,
    pub held_keys: Vec<u32>,
    pub held_buttons: Vec<u32>,
    pub accepted: u64,
}

#[derive(Debug)]
pub struct SyntheticDevice {
    pub(super) id: DeviceId,
    pub(super) name: String,
    pub(super) kind: DeviceKind,
    pub(super) capabilities: CapabilitySet,
    pub(super) handle: HostDeviceHandle,
    /// Validated events not yet taken by the server
    pub(super) pending: VecDeque<DeviceEvent>,
    pub(super) held_keys: BTreeSet<u32>,
    pub(super) held_buttons: BTreeSet<u32>,
    pub(super) next_serial: u64,
    pub(super) history: VecDeque<AcceptedEvent>,
}

impl SyntheticDevice {
    pub(super) fn new(
        id: DeviceId,
        name: String,
        kind: DeviceKind,
        capabilities: CapabilitySet,
        handle: HostDeviceHandle,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            capabilities,
            handle,
            pending: VecDeque::new(),
            held_keys: BTreeSet::new(),
            held_buttons: BTreeSet::new(),
            next_serial: 1,
            history: VecDeque::with_capacity(HISTORY_SIZE),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> HostDeviceHandle {
        self.handle
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn history(&self) -> impl Iterator<Item = &AcceptedEvent> {
        self.history.iter()
    }

    /// Check an event against this device's capabilities without mutating anything.
    ///
    /// `screen` bounds absolute motion when a screen has been initialized.
    pub fn validate(&self, event: &InputEvent, screen: Option<(u32, u32)>) -> Result<DeviceEvent> {
        let invalid = |msg: String| Err(DriverError::InvalidEventPayload(msg));
        let has = |axis: Axis| self.capabilities.axes.contains(&axis);

        match event {
            InputEvent::Key { key, pressed } => {
                let Some(keycode) = key.to_keycode() else {
                    return invalid(format!("unknown key {:?}", key));
                };
                if !self.capabilities.keys.contains(&keycode) {
                    return invalid(format!(
                        "keycode {} is not in the capability set of device {}",
                        keycode, self.id
                    ));
                }
                Ok(DeviceEvent::Key {
                    keycode,
                    pressed: *pressed,
                })
            }
            InputEvent::Button { button, pressed } => {
                if !self.capabilities.buttons.contains(button) {
                    return invalid(format!(
                        "button {} is not in the capability set of device {}",
                        button, self.id
                    ));
                }
                Ok(DeviceEvent::Button {
                    button: *button,
                    pressed: *pressed,
                })
            }
            InputEvent::Motion { dx, dy } => {
                if *dx == 0 && *dy == 0 {
                    return invalid("motion with zero delta".into());
                }
                if (*dx != 0 && !has(Axis::RelX)) || (*dy != 0 && !has(Axis::RelY)) {
                    return invalid(format!("device {} has no matching relative axis", self.id));
                }
                Ok(DeviceEvent::Motion { dx: *dx, dy: *dy })
            }
            InputEvent::MotionAbsolute { x, y } => {
                if !has(Axis::AbsX) || !has(Axis::AbsY) {
                    return invalid(format!("device {} has no absolute axes", self.id));
                }
                let (Ok(ux), Ok(uy)) = (u32::try_from(*x), u32::try_from(*y)) else {
                    return invalid(format!("absolute position ({}, {}) is negative", x, y));
                };
                if let Some((width, height)) = screen {
                    if ux >= width || uy >= height {
                        return invalid(format!(
                            "absolute position ({}, {}) outside {}x{} screen",
                            x, y, width, height
                        ));
                    }
                }
                Ok(DeviceEvent::MotionAbsolute { x: ux, y: uy })
            }
            InputEvent::Scroll { axis, delta } => {
                if !has(axis.axis()) {
                    return invalid(format!("device {} cannot scroll {:?}", self.id, axis));
                }
                if !delta.is_finite() || *delta == 0.0 {
                    return invalid(format!("scroll delta {} is not a usable amount", delta));
                }
                Ok(DeviceEvent::Scroll {
                    axis: *axis,
                    delta: *delta,
                })
            }
        }
    }

    /// Record an event the server accepted and return its serial.
    pub(super) fn accept(&mut self, event: DeviceEvent) -> u64 {
        match event {
            DeviceEvent::Key { keycode, pressed } => {
                if pressed {
                    self.held_keys.insert(keycode);
                } else {
                    self.held_keys.remove(&keycode);
                }
            }
            DeviceEvent::Button { button, pressed } => {
                if pressed {
                    self.held_buttons.insert(button);
                } else {
                    self.held_buttons.remove(&button);
                }
            }
            _ => {}
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        if self.history.len() >= HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(AcceptedEvent { serial, event });
        serial
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            keys: self.capabilities.keys.len(),
            buttons: self.capabilities.buttons.iter().copied().collect(),
            axes: self.capabilities.axes.iter().copied().collect(),
            held_keys: self.held_keys.iter().copied().collect(),
            held_buttons: self.held_buttons.iter().copied().collect(),
            accepted: self.next_serial - 1,
        }
    }
}
