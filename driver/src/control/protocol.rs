//! Control channel wire format
//!
//! One JSON object per line in each direction. A request names the driver it
//! targets and one operation; the response echoes the request's `seq`.
//!
//! ```text
//! -> {"seq":3,"target":"video","op":{"name":"set-screen-config","args":{"config":{...}}}}
//! <- {"status":"ok","seq":3,"payload":{"type":"screen-config",...}}
//! <- {"status":"error","seq":3,"kind":"ReconfigureNotSupported","message":"..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::driver::Phase;
use crate::error::{DriverError, ErrorKind};
use crate::input::{Accepted, Capabilities, DeviceId, DeviceInfo, DeviceKind, InputEvent};
use crate::video::{FillPattern, FrameDump, Mode, ScreenConfig, VideoState};

/// Bumped whenever a message changes shape
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Driver,
    Video,
    Input,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "name", content = "args", rename_all = "kebab-case")]
pub enum Operation {
    Hello { version: u32 },
    Status,
    GetScreenConfig,
    SetScreenConfig { config: ScreenConfig },
    GetModes,
    DumpFrameBuffer,
    Fill { pattern: FillPattern },
    RegisterDevice {
        kind: DeviceKind,
        capabilities: Capabilities,
    },
    Inject { device: DeviceId, event: InputEvent },
    ListDevices,
}

impl Operation {
    /// The driver that owns this operation
    pub fn target(&self) -> Target {
        match self {
            Operation::Hello { .. } | Operation::Status => Target::Driver,
            Operation::GetScreenConfig
            | Operation::SetScreenConfig { .. }
            | Operation::GetModes
            | Operation::DumpFrameBuffer
            | Operation::Fill { .. } => Target::Video,
            Operation::RegisterDevice { .. }
            | Operation::Inject { .. }
            | Operation::ListDevices => Target::Input,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Hello { .. } => "hello",
            Operation::Status => "status",
            Operation::GetScreenConfig => "get-screen-config",
            Operation::SetScreenConfig { .. } => "set-screen-config",
            Operation::GetModes => "get-modes",
            Operation::DumpFrameBuffer => "dump-frame-buffer",
            Operation::Fill { .. } => "fill",
            Operation::RegisterDevice { .. } => "register-device",
            Operation::Inject { .. } => "inject",
            Operation::ListDevices => "list-devices",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Request {
    pub seq: u64,
    pub target: Target,
    pub op: Operation,
}

impl Request {
    pub fn new(seq: u64, op: Operation) -> Self {
        Self {
            seq,
            target: op.target(),
            op,
        }
    }

    /// Decode one line.
    ///
    /// On failure the error comes back with whatever `seq` could be salvaged
    /// (0 if none) so the rejection can still be correlated.
    pub fn decode(line: &str) -> Result<Self, (u64, DriverError)> {
        let request: Request = serde_json::from_str(line).map_err(|e| {
            let seq = serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .and_then(|v| v.get("seq").and_then(|s| s.as_u64()))
                .unwrap_or(0);
            (seq, DriverError::MalformedRequest(e.to_string()))
        })?;

        if request.target != request.op.target() {
            return Err((
                request.seq,
                DriverError::MalformedRequest(format!(
                    "operation {} does not belong to target {:?}",
                    request.op.name(),
                    request.target
                )),
            ));
        }
        Ok(request)
    }
}

/// Driver-wide status snapshot
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DriverStatus {
    pub protocol_version: u32,
    pub phase: Phase,
    pub video: VideoState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub video_failure: Option<String>,
    pub frames_presented: u64,
    pub devices: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Payload {
    Empty,
    Hello { version: u32, driver: String },
    Status(DriverStatus),
    ScreenConfig(ScreenConfig),
    Modes { modes: Vec<Mode> },
    FrameBuffer(FrameDump),
    Device { id: DeviceId },
    Devices { devices: Vec<DeviceInfo> },
    Accepted(Accepted),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok {
        seq: u64,
        payload: Payload,
    },
    Error {
        seq: u64,
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn ok(seq: u64, payload: Payload) -> Self {
        Response::Ok { seq, payload }
    }

    pub fn error(seq: u64, error: &DriverError) -> Self {
        Response::Error {
            seq,
            kind: error.kind(),
            message: error.message().to_string(),
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Response::Ok { seq, .. } | Response::Error { seq, .. } => *seq,
        }
    }

    pub fn into_result(self) -> Result<Payload, DriverError> {
        match self {
            Response::Ok { payload, .. } => Ok(payload),
            Response::Error { kind, message, .. } => Err(DriverError::from_wire(kind, message)),
        }
    }
}
