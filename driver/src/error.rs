//! Error taxonomy shared by the driver and the harness.
//!
//! Every failure the harness can observe maps onto one [`ErrorKind`], which is
//! what travels over the control channel. [`DriverError`] carries the kind plus
//! a human-readable message on either side of the socket.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level error kind
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ChannelUnavailable,
    ChannelClosed,
    ChannelTimeout,
    MalformedRequest,
    UnsupportedOperation,
    AllocationFailed,
    ReconfigureNotSupported,
    DeviceRegistrationFailed,
    InvalidEventPayload,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("control channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("control channel closed: {0}")]
    ChannelClosed(String),
    #[error("control channel timed out: {0}")]
    ChannelTimeout(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("framebuffer allocation failed: {0}")]
    AllocationFailed(String),
    #[error("reconfiguration not supported: {0}")]
    ReconfigureNotSupported(String),
    #[error("device registration failed: {0}")]
    DeviceRegistrationFailed(String),
    #[error("invalid event payload: {0}")]
    InvalidEventPayload(String),
}

pub type Result<T, E = DriverError> = std::result::Result<T, E>;

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::ChannelUnavailable(_) => ErrorKind::ChannelUnavailable,
            DriverError::ChannelClosed(_) => ErrorKind::ChannelClosed,
            DriverError::ChannelTimeout(_) => ErrorKind::ChannelTimeout,
            DriverError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            DriverError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            DriverError::AllocationFailed(_) => ErrorKind::AllocationFailed,
            DriverError::ReconfigureNotSupported(_) => ErrorKind::ReconfigureNotSupported,
            DriverError::DeviceRegistrationFailed(_) => ErrorKind::DeviceRegistrationFailed,
            DriverError::InvalidEventPayload(_) => ErrorKind::InvalidEventPayload,
        }
    }

    /// The message without the kind prefix that `Display` adds
    pub fn message(&self) -> &str {
        match self {
            DriverError::ChannelUnavailable(m)
            | DriverError::ChannelClosed(m)
            | DriverError::ChannelTimeout(m)
            | DriverError::MalformedRequest(m)
            | DriverError::UnsupportedOperation(m)
            | DriverError::AllocationFailed(m)
            | DriverError::ReconfigureNotSupported(m)
            | DriverError::DeviceRegistrationFailed(m)
            | DriverError::InvalidEventPayload(m) => m,
        }
    }

    /// Rebuild an error from the kind and message carried by an error response.
    pub fn from_wire(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::ChannelUnavailable => DriverError::ChannelUnavailable(message),
            ErrorKind::ChannelClosed => DriverError::ChannelClosed(message),
            ErrorKind::ChannelTimeout => DriverError::ChannelTimeout(message),
            ErrorKind::MalformedRequest => DriverError::MalformedRequest(message),
            ErrorKind::UnsupportedOperation => DriverError::UnsupportedOperation(message),
            ErrorKind::AllocationFailed => DriverError::AllocationFailed(message),
            ErrorKind::ReconfigureNotSupported => DriverError::ReconfigureNotSupported(message),
            ErrorKind::DeviceRegistrationFailed => DriverError::DeviceRegistrationFailed(message),
            ErrorKind::InvalidEventPayload => DriverError::InvalidEventPayload(message),
        }
    }
}
