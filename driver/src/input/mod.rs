//! Input device driver
//!
//! Registers synthetic keyboards and pointers with the server and feeds them
//! events on command. Events are checked against the device's declared
//! capabilities before anything is queued; once queued they are handed to the
//! server in order through the same submission call a hardware driver uses.

mod device;
mod event;
pub mod keymap;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use device::{
    AcceptedEvent, Axis, Capabilities, CapabilitySet, DeviceId, DeviceInfo, DeviceKind,
    SyntheticDevice, MAX_BUTTON,
};
pub use event::{DeviceEvent, InputEvent, ScrollAxis};
pub use keymap::KeyId;

use crate::error::{DriverError, Result};
use crate::host::Host;

/// Receipt for an accepted event
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accepted {
    pub device: DeviceId,
    pub serial: u64,
}

#[derive(Debug, Default)]
pub struct InputDriver {
    devices: BTreeMap<DeviceId, SyntheticDevice>,
    next_id: u32,
    unloaded: bool,
}

impl InputDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self, id: DeviceId) -> Option<&SyntheticDevice> {
        self.devices.get(&id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &SyntheticDevice> {
        self.devices.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.unloaded {
            return Err(DriverError::UnsupportedOperation(
                "input driver is unloaded".into(),
            ));
        }
        Ok(())
    }

    /// Register a device with harness-declared capabilities.
    pub fn register_device(
        &mut self,
        host: &mut dyn Host,
        kind: DeviceKind,
        capabilities: &Capabilities,
    ) -> Result<DeviceId> {
        self.ensure_loaded()?;
        let set = CapabilitySet::resolve(kind, capabilities)?;
        self.register_resolved(host, kind, set)
    }

    /// Register a device of `kind` with the full default capability set.
    pub fn register_default(&mut self, host: &mut dyn Host, kind: DeviceKind) -> Result<DeviceId> {
        self.ensure_loaded()?;
        self.register_resolved(host, kind, CapabilitySet::default_for(kind))
    }

    fn register_resolved(
        &mut self,
        host: &mut dyn Host,
        kind: DeviceKind,
        capabilities: CapabilitySet,
    ) -> Result<DeviceId> {
        let id = DeviceId(self.next_id + 1);
        let name = match kind {
            DeviceKind::Keyboard => format!("synthd-keyboard-{}", id),
            DeviceKind::Pointer => format!("synthd-pointer-{}", id),
        };

        let handle = host
            .register_input_device(&name, kind, &capabilities)
            .map_err(|e| {
                warn!("Server rejected device {}: {}", name, e);
                DriverError::DeviceRegistrationFailed(format!("server rejected {}: {}", name, e))
            })?;

        self.next_id += 1;
        info!(
            "Registered {:?} device {} ({} keys, {} buttons, {} axes)",
            kind,
            name,
            capabilities.keys.len(),
            capabilities.buttons.len(),
            capabilities.axes.len()
        );
        self.devices.insert(
            id,
            SyntheticDevice::new(id, name, kind, capabilities, handle),
        );
        Ok(id)
    }

    /// Validate, queue and submit one event.
    ///
    /// A rejected event leaves the device untouched. Returns once the server
    /// has taken the event; delivery to clients is the server's business.
    pub fn inject(
        &mut self,
        host: &mut dyn Host,
        id: DeviceId,
        event: &InputEvent,
        screen: Option<(u32, u32)>,
    ) -> Result<Accepted> {
        self.ensure_loaded()?;
        let device = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| DriverError::InvalidEventPayload(format!("no device {}", id)))?;

        let event = device.validate(event, screen)?;
        device.pending.push_back(event);

        let mut serial = 0;
        while let Some(event) = device.pending.pop_front() {
            if let Err(e) = host.post_input_event(device.handle, &event) {
                // Whatever is still queued was validated after this one and
                // must not overtake it
                device.pending.clear();
                warn!("Server refused {:?} on device {}: {}", event, id, e);
                return Err(DriverError::InvalidEventPayload(format!(
                    "server refused event: {}",
                    e
                )));
            }
            debug!("Device {} posted {:?}", id, event);
            serial = device.accept(event);
        }

        Ok(Accepted { device: id, serial })
    }

    /// Release everything the device holds, then remove it from the server.
    pub fn close_device(&mut self, host: &mut dyn Host, id: DeviceId) -> Result<()> {
        let mut device = self
            .devices
            .remove(&id)
            .ok_or_else(|| DriverError::InvalidEventPayload(format!("no device {}", id)))?;
        release_held(host, &mut device);
        host.unregister_input_device(device.handle);
        info!("Closed device {}", device.name);
        Ok(())
    }

    /// Close every device. Safe to call more than once.
    pub fn unload(&mut self, host: &mut dyn Host) {
        let ids: Vec<_> = self.devices.keys().copied().collect();
        for id in ids {
            let _ = self.close_device(host, id);
        }
        if !self.unloaded {
            info!("Input driver unloaded");
        }
        self.unloaded = true;
    }
}

/// Post releases for held keys and buttons so clients never see them stuck.
fn release_held(host: &mut dyn Host, device: &mut SyntheticDevice) {
    let keys: Vec<_> = std::mem::take(&mut device.held_keys).into_iter().collect();
    let buttons: Vec<_> = std::mem::take(&mut device.held_buttons).into_iter().collect();

    let releases = keys
        .into_iter()
        .map(|keycode| DeviceEvent::Key {
            keycode,
            pressed: false,
        })
        .chain(buttons.into_iter().map(|button| DeviceEvent::Button {
            button,
            pressed: false,
        }));

    for event in releases {
        if let Err(e) = host.post_input_event(device.handle, &event) {
            warn!("Failed to release {:?} on {}: {}", event, device.name, e);
        }
    }
}
