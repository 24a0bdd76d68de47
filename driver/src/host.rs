//! The display server as seen from the module.
//!
//! The server owns the driver registry, the input device list and the event
//! queue. Everything the module asks of it goes through [`Host`]; everything the
//! server asks of the module is a callback method on
//! [`DriverState`](crate::driver::DriverState).
//!
//! Two implementations exist: `module::FfiHost`, which forwards to the
//! server-side shim through a C vtable, and `testing::RecordingHost`.

use serde::Serialize;
use thiserror::Error;

use crate::input::{CapabilitySet, DeviceEvent, DeviceKind};

/// Which driver registry an entry goes into
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Video,
    Input,
}

/// The server's handle for a registered input device
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostDeviceHandle(pub u64);

/// Screen-space rectangle in pixels
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// The server refused a registration or an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostRejection(pub String);

pub trait Host {
    /// Add a driver to the server's registry (xf86AddDriver / xf86AddInputDriver).
    fn add_driver(&mut self, kind: DriverKind, name: &str);

    /// Create a server-side input device with the given capabilities.
    fn register_input_device(
        &mut self,
        name: &str,
        kind: DeviceKind,
        capabilities: &CapabilitySet,
    ) -> Result<HostDeviceHandle, HostRejection>;

    fn unregister_input_device(&mut self, handle: HostDeviceHandle);

    /// Submit one event through the same path hardware events take.
    ///
    /// Returns once the server has queued the event, not once it is delivered.
    fn post_input_event(
        &mut self,
        handle: HostDeviceHandle,
        event: &DeviceEvent,
    ) -> Result<(), HostRejection>;

    /// Tell the server part of the framebuffer changed.
    fn damage(&mut self, area: Rect);
}
