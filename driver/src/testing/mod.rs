//! Testing infrastructure for synthd
//!
//! Drives the module without a display server.
//!
//! # Architecture
//!
//! 1. **RecordingHost**: a [`Host`](crate::host::Host) that remembers every
//!    driver, device, event and damage rectangle the module hands it.
//!
//! 2. **HostLoop**: a calloop event loop owning a `DriverState<RecordingHost>`
//!    with the control channel registered, standing in for the server's main
//!    loop.
//!
//! 3. **HostThread**: runs a `HostLoop` on its own thread so a blocking
//!    [`ControlClient`](crate::control::ControlClient) can talk to it from the
//!    test thread.
//!
//! # Example
//!
//! ```ignore
//! use synthd_core::testing::{unique_socket_path, HostThread};
//! use synthd_core::{ControlClient, ControlConfig};
//!
//! #[test]
//! fn test_modes() {
//!     let config = ControlConfig::new(unique_socket_path());
//!     let host = HostThread::spawn(config.clone(), |host| host.boot()).unwrap();
//!
//!     let mut client = ControlClient::connect(&config).unwrap();
//!     assert!(!client.modes().unwrap().is_empty());
//!
//!     let recorded = host.stop().unwrap();
//!     assert_eq!(recorded.registered_devices().len(), 0);
//! }
//! ```

mod host_loop;
mod recording;

pub use host_loop::{HostLoop, HostThread};
pub use recording::{PostedEvent, RecordingHost, RegisteredDevice};

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static SOCKET_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A control socket path no other test in this process is using
pub fn unique_socket_path() -> PathBuf {
    let n = SOCKET_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("synthd-test-{}-{}.sock", std::process::id(), n))
}
