//! In-memory stand-in for the display server

use crate::host::{DriverKind, Host, HostDeviceHandle, HostRejection, Rect};
use crate::input::{CapabilitySet, DeviceEvent, DeviceKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredDevice {
    pub handle: HostDeviceHandle,
    pub name: String,
    pub kind: DeviceKind,
    pub capabilities: CapabilitySet,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PostedEvent {
    pub handle: HostDeviceHandle,
    pub event: DeviceEvent,
}

#[derive(Clone, Debug, Default)]
pub struct RecordingHost {
    drivers: Vec<(DriverKind, String)>,
    devices: Vec<RegisteredDevice>,
    next_handle: u64,
    posted: Vec<PostedEvent>,
    damage: Vec<Rect>,
    rejected_kinds: Vec<DeviceKind>,
    refuse_events: bool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every later registration of `kind`
    pub fn reject_devices(&mut self, kind: DeviceKind) {
        self.rejected_kinds.push(kind);
    }

    pub fn refuse_events(&mut self, refuse: bool) {
        self.refuse_events = refuse;
    }

    pub fn drivers(&self) -> &[(DriverKind, String)] {
        &self.drivers
    }

    /// Devices currently registered
    pub fn registered_devices(&self) -> &[RegisteredDevice] {
        &self.devices
    }

    /// Every event the server accepted, across devices, in arrival order
    pub fn posted_events(&self) -> &[PostedEvent] {
        &self.posted
    }

    pub fn events_for(&self, handle: HostDeviceHandle) -> Vec<DeviceEvent> {
        self.posted
            .iter()
            .filter(|p| p.handle == handle)
            .map(|p| p.event.clone())
            .collect()
    }

    pub fn damage_log(&self) -> &[Rect] {
        &self.damage
    }
}

impl Host for RecordingHost {
    fn add_driver(&mut self, kind: DriverKind, name: &str) {
        self.drivers.push((kind, name.to_string()));
    }

    fn register_input_device(
        &mut self,
        name: &str,
        kind: DeviceKind,
        capabilities: &CapabilitySet,
    ) -> Result<HostDeviceHandle, HostRejection> {
        if self.rejected_kinds.contains(&kind) {
            return Err(HostRejection(format!("{:?} devices are disabled", kind)));
        }
        self.next_handle += 1;
        let handle = HostDeviceHandle(self.next_handle);
        self.devices.push(RegisteredDevice {
            handle,
            name: name.to_string(),
            kind,
            capabilities: capabilities.clone(),
        });
        Ok(handle)
    }

    fn unregister_input_device(&mut self, handle: HostDeviceHandle) {
        self.devices.retain(|d| d.handle != handle);
    }

    fn post_input_event(
        &mut self,
        handle: HostDeviceHandle,
        event: &DeviceEvent,
    ) -> Result<(), HostRejection> {
        if self.refuse_events {
            return Err(HostRejection("event queue refused".into()));
        }
        if !self.devices.iter().any(|d| d.handle == handle) {
            return Err(HostRejection(format!("unknown device handle {}", handle.0)));
        }
        self.posted.push(PostedEvent {
            handle,
            event: event.clone(),
        });
        Ok(())
    }

    fn damage(&mut self, area: Rect) {
        self.damage.push(area);
    }
}
