//! Driver side of the control channel
//!
//! The listener and the peer stream are non-blocking; the host's loop tells us
//! when either is readable and we drain what is there. Requests come out of
//! [`ControlServer::next_incoming`] in arrival order and the caller answers each
//! one before asking for the next, which is what keeps dispatch single-file.

use std::collections::VecDeque;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::protocol::{Request, Response};
use crate::config::ControlConfig;
use crate::error::{DriverError, Result};

/// Longest accepted request line
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Upper bound on blocking while a response is written
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 64 * 1024;

/// A decoded line waiting for dispatch
#[derive(Debug)]
pub enum Incoming {
    Request(Request),
    /// The line could not be turned into a request; answer with the error
    Rejected { seq: u64, error: DriverError },
}

struct Peer {
    stream: UnixStream,
    buf: Vec<u8>,
    /// Skipping the tail of an oversized line
    discarding: bool,
    /// The harness closed its write side; answer what is queued, then drop
    hung_up: bool,
    queue: VecDeque<Incoming>,
}

impl Peer {
    fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            discarding: false,
            hung_up: false,
            queue: VecDeque::new(),
        }
    }

    /// Read everything available. Returns false once the harness hung up.
    fn fill(&mut self) -> bool {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return false,
                Ok(n) => self.split_lines(&chunk[..n]),
                Err(e) if e.kind() == IoErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Control read failed: {}", e);
                    return false;
                }
            }
        }
    }

    fn split_lines(&mut self, mut data: &[u8]) {
        while let Some(pos) = data.iter().position(|&b| b == b'\n') {
            let (head, rest) = data.split_at(pos);
            data = &rest[1..];
            if self.discarding {
                self.discarding = false;
                self.buf.clear();
                continue;
            }
            if self.buf.len() + head.len() > MAX_REQUEST_BYTES {
                self.buf.clear();
                self.reject_oversized();
                continue;
            }
            self.buf.extend_from_slice(head);
            let line = std::mem::take(&mut self.buf);
            self.decode_line(&line);
        }

        if self.discarding {
            return;
        }
        self.buf.extend_from_slice(data);
        if self.buf.len() > MAX_REQUEST_BYTES {
            self.buf.clear();
            self.discarding = true;
            self.reject_oversized();
        }
    }

    fn reject_oversized(&mut self) {
        self.queue.push_back(Incoming::Rejected {
            seq: 0,
            error: DriverError::MalformedRequest(format!(
                "request exceeds {} bytes",
                MAX_REQUEST_BYTES
            )),
        });
    }

    fn decode_line(&mut self, line: &[u8]) {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(e) => {
                self.queue.push_back(Incoming::Rejected {
                    seq: 0,
                    error: DriverError::MalformedRequest(format!("not UTF-8: {}", e)),
                });
                return;
            }
        };
        if text.is_empty() {
            return;
        }
        self.queue.push_back(match Request::decode(text) {
            Ok(request) => Incoming::Request(request),
            Err((seq, error)) => Incoming::Rejected { seq, error },
        });
    }

    fn write(&mut self, response: &Response) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');

        self.stream.set_nonblocking(false)?;
        self.stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let result = self
            .stream
            .write_all(&line)
            .and_then(|_| self.stream.flush());
        self.stream.set_nonblocking(true)?;
        result
    }

    /// Fail everything still queued and hang up.
    fn close(mut self, reason: &str) {
        let queued: Vec<_> = self.queue.drain(..).collect();
        for incoming in queued {
            let seq = match incoming {
                Incoming::Request(request) => request.seq,
                Incoming::Rejected { seq, .. } => seq,
            };
            let error = DriverError::ChannelClosed(reason.to_string());
            if self.write(&Response::error(seq, &error)).is_err() {
                break;
            }
        }
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
    peer: Option<Peer>,
    closed: bool,
}

impl ControlServer {
    /// Bind the control socket, replacing a stale socket file.
    ///
    /// Failure here means the module cannot be controlled and must not load.
    pub fn bind(config: &ControlConfig) -> Result<Self> {
        let path = config.socket_path.clone();
        let unavailable =
            |e: std::io::Error| DriverError::ChannelUnavailable(format!("{}: {}", path.display(), e));

        // Remove existing socket if present
        if path.exists() {
            std::fs::remove_file(&path).map_err(unavailable)?;
        }

        let listener = UnixListener::bind(&path).map_err(unavailable)?;
        listener.set_nonblocking(true).map_err(unavailable)?;
        info!("Control socket: {}", path.display());

        Ok(Self {
            listener,
            path,
            peer: None,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn listener(&self) -> &UnixListener {
        &self.listener
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    /// File descriptors the host should watch for readability
    pub fn fds(&self) -> Vec<RawFd> {
        let mut fds = Vec::with_capacity(2);
        if self.closed {
            return fds;
        }
        fds.push(self.listener.as_raw_fd());
        if let Some(peer) = &self.peer {
            fds.push(peer.stream.as_raw_fd());
        }
        fds
    }

    /// Accept a waiting harness connection, replacing any current one.
    ///
    /// Returns a clone of the new stream for readiness watching.
    pub fn accept(&mut self) -> Option<UnixStream> {
        if self.closed {
            return None;
        }
        let (stream, _) = match self.listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == IoErrorKind::WouldBlock => return None,
            Err(e) => {
                warn!("Control accept failed: {}", e);
                return None;
            }
        };
        if let Err(e) = stream.set_nonblocking(true) {
            warn!("Control stream setup failed: {}", e);
            return None;
        }
        let watch = match stream.try_clone() {
            Ok(watch) => watch,
            Err(e) => {
                warn!("Control stream clone failed: {}", e);
                return None;
            }
        };

        if let Some(old) = self.peer.take() {
            info!("Harness reconnected, dropping previous connection");
            old.close("replaced by a new harness connection");
        }
        info!("Harness connected");
        self.peer = Some(Peer::new(stream));
        Some(watch)
    }

    /// Pull in whatever the harness sent. Returns false if there is nothing
    /// left to answer.
    ///
    /// Complete requests that arrived before the harness hung up are still
    /// handed out; the peer goes away once they have been taken.
    pub fn read(&mut self) -> bool {
        let Some(peer) = self.peer.as_mut() else {
            return false;
        };
        if !peer.hung_up && !peer.fill() {
            peer.hung_up = true;
            info!(
                "Harness hung up with {} requests still to answer",
                peer.queue.len()
            );
        }
        if peer.hung_up && peer.queue.is_empty() {
            self.drop_peer();
            return false;
        }
        true
    }

    pub fn next_incoming(&mut self) -> Option<Incoming> {
        let peer = self.peer.as_mut()?;
        let next = peer.queue.pop_front();
        if next.is_none() && peer.hung_up {
            self.drop_peer();
        }
        next
    }

    fn drop_peer(&mut self) {
        if let Some(peer) = self.peer.take() {
            info!("Harness disconnected");
            let _ = peer.stream.shutdown(Shutdown::Both);
        }
    }

    pub fn respond(&mut self, response: &Response) {
        let Some(peer) = self.peer.as_mut() else {
            debug!("No harness to receive response {}", response.seq());
            return;
        };
        if let Err(e) = peer.write(response) {
            warn!("Failed to send response to harness, disconnecting: {}", e);
            self.drop_peer();
        }
    }

    /// Answer queued requests with `ChannelClosed`, hang up and remove the
    /// socket file. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(peer) = self.peer.take() {
            peer.close("driver is unloading");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Control socket {} not removed: {}", self.path.display(), e);
        }
        info!("Control channel closed");
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.close();
    }
}
