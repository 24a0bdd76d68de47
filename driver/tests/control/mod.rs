//! Harness-level tests over the control channel
//!
//! # Test Organization
//!
//! - `video.rs` - screen config round trips, fills, dumps, reconfiguration limits
//! - `input.rs` - device registration, injection order, capability checks
//! - `channel.rs` - malformed lines, timeouts, reconnects, unload behavior
//! - `wire.rs` - snapshots of the JSON each message puts on the socket

mod channel;
mod input;
mod video;
mod wire;
