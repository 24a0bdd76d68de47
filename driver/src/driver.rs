//! Loaded module context
//!
//! [`DriverState`] is the one value that exists per loaded module. The host
//! drives it through the callback methods below; the harness drives it through
//! the control channel. Both paths run on the host's thread and both go
//! through `&mut self`, so there is exactly one dispatch point.

use std::os::unix::io::RawFd;
use std::os::unix::net::{UnixListener, UnixStream};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ControlConfig;
use crate::control::{
    ControlServer, DriverStatus, Incoming, Operation, Payload, Request, Response,
    PROTOCOL_VERSION,
};
use crate::error::{DriverError, Result};
use crate::host::{DriverKind, Host};
use crate::input::{DeviceId, DeviceKind, InputDriver};
use crate::video::{FrameBuffer, Mode, ScreenInfo, VideoDriver};

/// Name the video driver registers under
pub const VIDEO_DRIVER_NAME: &str = "synthd";
/// Name the input driver registers under
pub const INPUT_DRIVER_NAME: &str = "synthd-input";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Live,
    TearingDown,
    Unloaded,
}

pub struct DriverState<H: Host> {
    phase: Phase,
    host: H,
    control: Option<ControlServer>,
    video: VideoDriver,
    input: InputDriver,
    display: Option<String>,
}

impl<H: Host> DriverState<H> {
    /// Bring the module up: bind the control channel, then register both
    /// drivers with the server.
    ///
    /// Nothing is registered if the channel cannot be bound.
    pub fn load(config: &ControlConfig, mut host: H) -> Result<Self> {
        let control = ControlServer::bind(config)?;

        host.add_driver(DriverKind::Video, VIDEO_DRIVER_NAME);
        host.add_driver(DriverKind::Input, INPUT_DRIVER_NAME);
        info!(
            "synthd loaded (protocol {}, display {})",
            PROTOCOL_VERSION,
            config.display.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            phase: Phase::Live,
            host,
            control: Some(control),
            video: VideoDriver::default(),
            input: InputDriver::new(),
            display: config.display.clone(),
        })
    }

    /// Tear everything down in reverse order of use. Safe to call more than
    /// once; also runs on drop.
    pub fn unload(&mut self) {
        if self.phase == Phase::Unloaded {
            return;
        }
        self.phase = Phase::TearingDown;
        info!("synthd unloading");

        if let Some(mut control) = self.control.take() {
            control.close();
        }
        self.input.unload(&mut self.host);
        self.video.close_screen();

        self.phase = Phase::Unloaded;
        info!("synthd unloaded");
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn video(&self) -> &VideoDriver {
        &self.video
    }

    pub fn input(&self) -> &InputDriver {
        &self.input
    }

    fn ensure_live(&self, what: &str) -> Result<()> {
        if self.phase != Phase::Live {
            return Err(DriverError::UnsupportedOperation(format!(
                "{} while module is {:?}",
                what, self.phase
            )));
        }
        Ok(())
    }

    // --- video callbacks ---

    pub fn video_probe(&mut self) -> Result<Vec<Mode>> {
        self.ensure_live("probe")?;
        self.video.probe()
    }

    pub fn video_screen_init(&mut self) -> Result<ScreenInfo> {
        self.ensure_live("screen init")?;
        self.video.screen_init()
    }

    pub fn video_framebuffer(&self) -> Result<&FrameBuffer> {
        self.ensure_live("framebuffer access")?;
        self.video.framebuffer().ok_or_else(|| {
            DriverError::UnsupportedOperation(format!(
                "no framebuffer in state {:?}",
                self.video.state()
            ))
        })
    }

    pub fn video_present(&mut self) -> Result<()> {
        self.ensure_live("present")?;
        self.video.present()
    }

    pub fn video_close_screen(&mut self) {
        self.video.close_screen();
    }

    // --- input callbacks ---

    /// The server brings up one of its configured input devices.
    pub fn input_device_init(&mut self, kind: DeviceKind) -> Result<DeviceId> {
        self.ensure_live("device init")?;
        self.input.register_default(&mut self.host, kind)
    }

    pub fn input_device_close(&mut self, id: DeviceId) -> Result<()> {
        self.ensure_live("device close")?;
        self.input.close_device(&mut self.host, id)
    }

    // --- control channel ---

    pub fn control_listener(&self) -> Option<&UnixListener> {
        self.control.as_ref().map(ControlServer::listener)
    }

    /// Descriptors the host should poll; ready ones mean
    /// [`service_control`](Self::service_control) has work.
    pub fn control_fds(&self) -> Vec<RawFd> {
        self.control
            .as_ref()
            .map(ControlServer::fds)
            .unwrap_or_default()
    }

    /// Accept a waiting harness connection. Returns a clone of the stream for
    /// readiness watching.
    pub fn accept_control(&mut self) -> Option<UnixStream> {
        if !self.is_live() {
            return None;
        }
        self.control.as_mut()?.accept()
    }

    /// Read what the harness sent and answer every complete request in order.
    ///
    /// Returns false once there is no harness connection left to watch.
    pub fn service_control(&mut self) -> bool {
        if !self.is_live() {
            return false;
        }
        let Some(control) = self.control.as_mut() else {
            return false;
        };
        if !control.read() {
            return false;
        }

        loop {
            let Some(incoming) = self.control.as_mut().and_then(ControlServer::next_incoming)
            else {
                break;
            };
            let response = match incoming {
                Incoming::Request(request) => self.dispatch(request),
                Incoming::Rejected { seq, error } => {
                    warn!("Rejected request {}: {}", seq, error);
                    Response::error(seq, &error)
                }
            };
            if let Some(control) = self.control.as_mut() {
                control.respond(&response);
            }
        }

        self.control
            .as_ref()
            .is_some_and(ControlServer::is_connected)
    }

    /// Run one request to completion.
    pub fn dispatch(&mut self, request: Request) -> Response {
        let name = request.op.name();
        debug!("Request {} {}", request.seq, name);
        match self.execute(request.op) {
            Ok(payload) => Response::ok(request.seq, payload),
            Err(e) => {
                warn!("Request {} {} failed: {}", request.seq, name, e);
                Response::error(request.seq, &e)
            }
        }
    }

    fn execute(&mut self, op: Operation) -> Result<Payload> {
        self.ensure_live(op.name())?;
        match op {
            Operation::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    return Err(DriverError::UnsupportedOperation(format!(
                        "protocol {} requested, driver speaks {}",
                        version, PROTOCOL_VERSION
                    )));
                }
                Ok(Payload::Hello {
                    version: PROTOCOL_VERSION,
                    driver: format!("{} {}", VIDEO_DRIVER_NAME, env!("CARGO_PKG_VERSION")),
                })
            }
            Operation::Status => Ok(Payload::Status(self.status())),
            Operation::GetScreenConfig => self.video.screen_config().map(Payload::ScreenConfig),
            Operation::SetScreenConfig { config } => {
                self.video.set_screen_config(config)?;
                self.video.screen_config().map(Payload::ScreenConfig)
            }
            Operation::GetModes => self.video.modes().map(|modes| Payload::Modes { modes }),
            Operation::DumpFrameBuffer => self.video.dump_frame_buffer().map(Payload::FrameBuffer),
            Operation::Fill { pattern } => {
                self.video.fill(&pattern, &mut self.host)?;
                Ok(Payload::Empty)
            }
            Operation::RegisterDevice { kind, capabilities } => self
                .input
                .register_device(&mut self.host, kind, &capabilities)
                .map(|id| Payload::Device { id }),
            Operation::Inject { device, event } => {
                let screen = self.screen_bounds();
                self.input
                    .inject(&mut self.host, device, &event, screen)
                    .map(Payload::Accepted)
            }
            Operation::ListDevices => Ok(Payload::Devices {
                devices: self.input.devices().map(|d| d.info()).collect(),
            }),
        }
    }

    pub fn status(&self) -> DriverStatus {
        DriverStatus {
            protocol_version: PROTOCOL_VERSION,
            phase: self.phase,
            video: self.video.state(),
            video_failure: self.video.failure().map(str::to_string),
            frames_presented: self.video.frames_presented(),
            devices: self.input.device_count(),
            display: self.display.clone(),
        }
    }

    /// Size absolute pointer motion is clamped against
    fn screen_bounds(&self) -> Option<(u32, u32)> {
        self.video
            .framebuffer()
            .map(|fb| (fb.config().width, fb.config().height))
    }
}

impl<H: Host> Drop for DriverState<H> {
    fn drop(&mut self) {
        self.unload();
    }
}
