//! Harness side of the control channel
//!
//! Blocking and single-threaded: each call writes one request and waits for
//! the matching response, bounded by the configured request timeout.

use std::io::{BufRead, BufReader, ErrorKind as IoErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use tracing::debug;

use super::protocol::{DriverStatus, Operation, Payload, Request, Response, PROTOCOL_VERSION};
use crate::config::ControlConfig;
use crate::error::{DriverError, Result};
use crate::input::{Accepted, Capabilities, DeviceId, DeviceInfo, DeviceKind, InputEvent};
use crate::video::{FillPattern, FrameDump, Mode, ScreenConfig};

const CONNECT_RETRY: Duration = Duration::from_millis(25);

pub struct ControlClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    /// Bytes of a response line read before a timeout hit
    partial: String,
    next_seq: u64,
    request_timeout: Duration,
    closed: bool,
    driver: String,
}

impl ControlClient {
    /// Connect to a driver, waiting up to the startup timeout for it to
    /// appear, and exchange protocol versions.
    pub fn connect(config: &ControlConfig) -> Result<Self> {
        let deadline = Instant::now() + config.startup_timeout;
        let stream = loop {
            match UnixStream::connect(&config.socket_path) {
                Ok(stream) => break stream,
                Err(e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DriverError::ChannelUnavailable(format!(
                            "{}: {} (waited {:?})",
                            config.socket_path.display(),
                            e,
                            config.startup_timeout
                        )));
                    }
                    std::thread::sleep(CONNECT_RETRY.min(deadline - now));
                }
            }
        };

        let unavailable = |e: std::io::Error| DriverError::ChannelUnavailable(e.to_string());
        let writer = stream.try_clone().map_err(unavailable)?;
        let mut client = Self {
            reader: BufReader::new(stream),
            writer,
            partial: String::new(),
            next_seq: 1,
            request_timeout: config.request_timeout,
            closed: false,
            driver: String::new(),
        };

        match client.send(Operation::Hello {
            version: PROTOCOL_VERSION,
        })? {
            Payload::Hello { version, driver } if version == PROTOCOL_VERSION => {
                debug!("Connected to {} (protocol {})", driver, version);
                client.driver = driver;
                Ok(client)
            }
            Payload::Hello { version, .. } => Err(DriverError::UnsupportedOperation(format!(
                "driver speaks protocol {}, expected {}",
                version, PROTOCOL_VERSION
            ))),
            other => Err(unexpected("hello", &other)),
        }
    }

    /// Name the driver reported during the handshake
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send one operation and wait for its response.
    pub fn send(&mut self, op: Operation) -> Result<Payload> {
        if self.closed {
            return Err(DriverError::ChannelClosed("connection already closed".into()));
        }

        let request = Request::new(self.next_seq, op);
        self.next_seq += 1;

        let mut line = serde_json::to_string(&request)
            .map_err(|e| DriverError::MalformedRequest(e.to_string()))?;
        line.push('\n');
        if let Err(e) = self.writer.write_all(line.as_bytes()) {
            self.closed = true;
            return Err(DriverError::ChannelClosed(e.to_string()));
        }

        let deadline = Instant::now() + self.request_timeout;
        loop {
            let response = self.read_response(deadline, request.op.name())?;
            if response.seq() != request.seq {
                // Left over from an earlier request that timed out
                debug!("Skipping stale response {}", response.seq());
                continue;
            }
            return response.into_result();
        }
    }

    fn read_response(&mut self, deadline: Instant, op: &str) -> Result<Response> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out(op, self.request_timeout));
            }
            self.reader
                .get_ref()
                .set_read_timeout(Some(remaining))
                .map_err(|e| DriverError::ChannelClosed(e.to_string()))?;

            match self.reader.read_line(&mut self.partial) {
                Ok(0) => {
                    self.closed = true;
                    return Err(DriverError::ChannelClosed(
                        "driver closed the connection".into(),
                    ));
                }
                Ok(_) if !self.partial.ends_with('\n') => continue,
                Ok(_) => {
                    let line = std::mem::take(&mut self.partial);
                    return serde_json::from_str(line.trim()).map_err(|e| {
                        DriverError::MalformedRequest(format!("bad response: {}", e))
                    });
                }
                Err(e)
                    if e.kind() == IoErrorKind::WouldBlock
                        || e.kind() == IoErrorKind::TimedOut =>
                {
                    return Err(timed_out(op, self.request_timeout));
                }
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(DriverError::ChannelClosed(e.to_string()));
                }
            }
        }
    }

    pub fn status(&mut self) -> Result<DriverStatus> {
        match self.send(Operation::Status)? {
            Payload::Status(status) => Ok(status),
            other => Err(unexpected("status", &other)),
        }
    }

    pub fn screen_config(&mut self) -> Result<ScreenConfig> {
        match self.send(Operation::GetScreenConfig)? {
            Payload::ScreenConfig(config) => Ok(config),
            other => Err(unexpected("get-screen-config", &other)),
        }
    }

    pub fn set_screen_config(&mut self, config: ScreenConfig) -> Result<ScreenConfig> {
        match self.send(Operation::SetScreenConfig { config })? {
            Payload::ScreenConfig(config) => Ok(config),
            other => Err(unexpected("set-screen-config", &other)),
        }
    }

    pub fn modes(&mut self) -> Result<Vec<Mode>> {
        match self.send(Operation::GetModes)? {
            Payload::Modes { modes } => Ok(modes),
            other => Err(unexpected("get-modes", &other)),
        }
    }

    pub fn dump_frame_buffer(&mut self) -> Result<FrameDump> {
        match self.send(Operation::DumpFrameBuffer)? {
            Payload::FrameBuffer(dump) => Ok(dump),
            other => Err(unexpected("dump-frame-buffer", &other)),
        }
    }

    pub fn fill(&mut self, pattern: FillPattern) -> Result<()> {
        match self.send(Operation::Fill { pattern })? {
            Payload::Empty => Ok(()),
            other => Err(unexpected("fill", &other)),
        }
    }

    pub fn register_device(
        &mut self,
        kind: DeviceKind,
        capabilities: Capabilities,
    ) -> Result<DeviceId> {
        match self.send(Operation::RegisterDevice { kind, capabilities })? {
            Payload::Device { id } => Ok(id),
            other => Err(unexpected("register-device", &other)),
        }
    }

    pub fn inject(&mut self, device: DeviceId, event: InputEvent) -> Result<Accepted> {
        match self.send(Operation::Inject { device, event })? {
            Payload::Accepted(accepted) => Ok(accepted),
            other => Err(unexpected("inject", &other)),
        }
    }

    pub fn devices(&mut self) -> Result<Vec<DeviceInfo>> {
        match self.send(Operation::ListDevices)? {
            Payload::Devices { devices } => Ok(devices),
            other => Err(unexpected("list-devices", &other)),
        }
    }

    /// Hang up. Further calls fail with `ChannelClosed`.
    pub fn close(&mut self) {
        if !self.closed {
            let _ = self.writer.shutdown(std::net::Shutdown::Both);
            self.closed = true;
        }
    }
}

impl Drop for ControlClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn timed_out(op: &str, timeout: Duration) -> DriverError {
    DriverError::ChannelTimeout(format!("no response to {} within {:?}", op, timeout))
}

fn unexpected(op: &str, payload: &Payload) -> DriverError {
    DriverError::MalformedRequest(format!("unexpected {} response: {:?}", op, payload))
}
