//! Control channel between the test harness and the driver
//!
//! The driver binds a Unix socket when the module loads and serves one
//! harness connection at a time. [`ControlClient`] is the harness end.

mod client;
pub mod protocol;
mod server;
mod watch;

pub use client::ControlClient;
pub use protocol::{DriverStatus, Operation, Payload, Request, Response, Target, PROTOCOL_VERSION};
pub use server::{ControlServer, Incoming, MAX_REQUEST_BYTES};
pub use watch::watch;
