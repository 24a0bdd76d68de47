//! synthd - synthetic display driver
//!
//! A loadable display-server module that acts as both a video output driver
//! and an input driver, steered by an external test harness over a Unix socket.
pub mod config;
pub mod control;
pub mod driver;
pub mod error;
pub mod host;
pub mod input;
pub mod module;
pub mod video;

pub mod testing;

pub use config::ControlConfig;
pub use control::ControlClient;
pub use driver::{DriverState, Phase};
pub use error::{DriverError, ErrorKind, Result};
pub use host::Host;
