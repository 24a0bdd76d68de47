//! Control channel endpoint discovery.
//!
//! The process environment is the only configuration surface. Harness and
//! driver both call [`ControlConfig::from_env`] so they agree on the socket.

use std::path::PathBuf;
use std::time::Duration;

/// Socket filename used when `SYNTHD_CONTROL_SOCKET` is not set
const CONTROL_SOCKET_NAME: &str = "synthd.sock";

pub const ENV_CONTROL_SOCKET: &str = "SYNTHD_CONTROL_SOCKET";
pub const ENV_STARTUP_TIMEOUT: &str = "SYNTHD_STARTUP_TIMEOUT_MS";
pub const ENV_REQUEST_TIMEOUT: &str = "SYNTHD_REQUEST_TIMEOUT_MS";
pub const ENV_DISPLAY: &str = "SYNTHD_DISPLAY";

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    pub socket_path: PathBuf,
    /// How long `ControlClient::connect` keeps retrying
    pub startup_timeout: Duration,
    /// How long `ControlClient::send` waits for a response
    pub request_timeout: Duration,
    /// Display name of the host server, published for the harness
    pub display: Option<String>,
}

impl ControlConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            display: None,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let socket_path = match lookup(ENV_CONTROL_SOCKET) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => default_socket_path(lookup("XDG_RUNTIME_DIR")),
        };
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            socket_path,
            startup_timeout: millis(ENV_STARTUP_TIMEOUT, DEFAULT_STARTUP_TIMEOUT),
            request_timeout: millis(ENV_REQUEST_TIMEOUT, DEFAULT_REQUEST_TIMEOUT),
            display: lookup(ENV_DISPLAY).filter(|d| !d.is_empty()),
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn default_socket_path(runtime_dir: Option<String>) -> PathBuf {
    match runtime_dir {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(CONTROL_SOCKET_NAME),
        _ => PathBuf::from("/tmp").join(CONTROL_SOCKET_NAME),
    }
}
