//! Event loop integration
//!
//! Hosts written in Rust can hand the control channel to a calloop loop
//! instead of polling the descriptors from [`DriverState::control_fds`].

use std::cell::RefCell;
use std::rc::Rc;

use calloop::{generic::Generic, Interest, LoopHandle, Mode, PostAction, RegistrationToken};
use tracing::{debug, warn};

use crate::driver::DriverState;
use crate::error::{DriverError, Result};
use crate::host::Host;

/// Register the control listener, and every harness stream it accepts, with
/// `handle`. Requests are dispatched from inside the loop callbacks.
pub fn watch<H: Host + 'static>(
    handle: &LoopHandle<'static, DriverState<H>>,
    state: &DriverState<H>,
) -> Result<RegistrationToken> {
    let listener = state
        .control_listener()
        .ok_or_else(|| DriverError::ChannelUnavailable("control channel is closed".into()))?
        .try_clone()
        .map_err(|e| DriverError::ChannelUnavailable(e.to_string()))?;

    // Track the stream registration so a reconnect replaces it
    let stream_token: Rc<RefCell<Option<RegistrationToken>>> = Rc::new(RefCell::new(None));
    let loop_handle = handle.clone();

    handle
        .insert_source(
            Generic::new(listener, Interest::READ, Mode::Level),
            move |_, _, state: &mut DriverState<H>| {
                if !state.is_live() {
                    return Ok(PostAction::Remove);
                }

                if let Some(stream) = state.accept_control() {
                    if let Some(token) = stream_token.borrow_mut().take() {
                        loop_handle.remove(token);
                    }

                    let inserted = loop_handle.insert_source(
                        Generic::new(stream, Interest::READ, Mode::Level),
                        |_, _, state: &mut DriverState<H>| {
                            if state.service_control() {
                                Ok(PostAction::Continue)
                            } else {
                                debug!("Control stream watch removed");
                                Ok(PostAction::Remove)
                            }
                        },
                    );
                    match inserted {
                        Ok(token) => *stream_token.borrow_mut() = Some(token),
                        Err(e) => warn!("Failed to watch control stream: {}", e.error),
                    }

                    // Bytes may already be waiting
                    state.service_control();
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|e| DriverError::ChannelUnavailable(e.error.to_string()))
}
