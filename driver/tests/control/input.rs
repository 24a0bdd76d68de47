//! Input driver behavior as seen by the harness

use proptest::prelude::*;
use synthd_core::control::{Operation, Payload, Request};
use synthd_core::input::{
    Axis, Capabilities, DeviceEvent, DeviceId, DeviceKind, InputEvent, KeyId, ScrollAxis,
};
use synthd_core::testing::{unique_socket_path, RecordingHost};
use synthd_core::{ControlConfig, DriverError, DriverState};

use crate::booted;

const LETTERS: &[&str] = &["a", "b", "c", "d", "e", "f"];

fn keyboard(state: &mut DriverState<RecordingHost>) -> DeviceId {
    let op = Operation::RegisterDevice {
        kind: DeviceKind::Keyboard,
        capabilities: Capabilities::keys(LETTERS.iter().copied()),
    };
    match state.dispatch(Request::new(1, op)).into_result().unwrap() {
        Payload::Device { id } => id,
        other => panic!("unexpected {:?}", other),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Events reach the server in the order they were injected, serials
    /// count up from one
    #[test]
    fn prop_injection_order_is_preserved(
        presses in prop::collection::vec((0..LETTERS.len(), any::<bool>()), 1..40)
    ) {
        let mut state = DriverState::load(
            &ControlConfig::new(unique_socket_path()),
            RecordingHost::new(),
        ).unwrap();
        let id = keyboard(&mut state);

        for (n, &(letter, pressed)) in presses.iter().enumerate() {
            let op = Operation::Inject { device: id, event: InputEvent::key(LETTERS[letter], pressed) };
            match state.dispatch(Request::new(n as u64 + 2, op)).into_result().unwrap() {
                Payload::Accepted(accepted) => prop_assert_eq!(accepted.serial, n as u64 + 1),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        let handle = state.input().device(id).unwrap().handle();
        let expected: Vec<_> = presses
            .iter()
            .map(|&(letter, pressed)| DeviceEvent::Key {
                keycode: KeyId::from(LETTERS[letter]).to_keycode().unwrap(),
                pressed,
            })
            .collect();
        prop_assert_eq!(state.host().events_for(handle), expected);
    }
}

/// An out-of-capability key is refused and the device is left as it was
#[test]
fn test_out_of_capability_key() {
    let (host, mut client) = booted();
    let id = client
        .register_device(DeviceKind::Keyboard, Capabilities::keys(["a"]))
        .unwrap();
    client.inject(id, InputEvent::key("a", true)).unwrap();
    let before = client
        .devices()
        .unwrap()
        .into_iter()
        .find(|d| d.id == id)
        .unwrap();

    for key in [InputEvent::key("z", true), InputEvent::key(9u32, true)] {
        let err = client.inject(id, key).unwrap_err();
        assert!(matches!(err, DriverError::InvalidEventPayload(_)));
    }

    let after = client
        .devices()
        .unwrap()
        .into_iter()
        .find(|d| d.id == id)
        .unwrap();
    assert_eq!(before, after);
    assert_eq!(after.held_keys, vec![38]);

    drop(client);
    host.stop().unwrap();
}

#[test]
fn test_pointer_events() {
    let (host, mut client) = booted();
    let id = client
        .register_device(
            DeviceKind::Pointer,
            Capabilities {
                buttons: vec![1, 3],
                axes: vec![Axis::RelX, Axis::RelY, Axis::AbsX, Axis::AbsY, Axis::ScrollVertical],
                ..Capabilities::default()
            },
        )
        .unwrap();

    client.inject(id, InputEvent::MotionAbsolute { x: 10, y: 20 }).unwrap();
    client.inject(id, InputEvent::Motion { dx: 5, dy: -3 }).unwrap();
    client.inject(id, InputEvent::button(1, true)).unwrap();
    client.inject(id, InputEvent::button(1, false)).unwrap();
    client
        .inject(
            id,
            InputEvent::Scroll {
                axis: ScrollAxis::Vertical,
                delta: 1.0,
            },
        )
        .unwrap();

    // Not declared
    for event in [
        InputEvent::button(2, true),
        InputEvent::Scroll {
            axis: ScrollAxis::Horizontal,
            delta: 1.0,
        },
        InputEvent::MotionAbsolute { x: 5000, y: 0 },
    ] {
        assert!(matches!(
            client.inject(id, event),
            Err(DriverError::InvalidEventPayload(_))
        ));
    }

    drop(client);
    let recorded = host.stop().unwrap();
    // Everything was unregistered on unload
    assert!(recorded.registered_devices().is_empty());
    let pointer_events: Vec<_> = recorded
        .posted_events()
        .iter()
        .map(|p| p.event.clone())
        .collect();
    assert_eq!(
        pointer_events,
        vec![
            DeviceEvent::MotionAbsolute { x: 10, y: 20 },
            DeviceEvent::Motion { dx: 5, dy: -3 },
            DeviceEvent::Button {
                button: 1,
                pressed: true
            },
            DeviceEvent::Button {
                button: 1,
                pressed: false
            },
            DeviceEvent::Scroll {
                axis: ScrollAxis::Vertical,
                delta: 1.0
            },
        ]
    );
}

#[test]
fn test_bad_capabilities_are_refused() {
    let (host, mut client) = booted();

    let err = client
        .register_device(DeviceKind::Keyboard, Capabilities::default())
        .unwrap_err();
    assert!(matches!(err, DriverError::DeviceRegistrationFailed(_)));

    let err = client
        .register_device(DeviceKind::Keyboard, Capabilities::keys(["no-such-key"]))
        .unwrap_err();
    assert!(matches!(err, DriverError::DeviceRegistrationFailed(_)));

    // The two default devices from boot are all there is
    assert_eq!(client.devices().unwrap().len(), 2);

    drop(client);
    host.stop().unwrap();
}

#[test]
fn test_unknown_device_is_invalid_payload() {
    let (host, mut client) = booted();
    let err = client
        .inject(DeviceId(99), InputEvent::key("a", true))
        .unwrap_err();
    assert!(matches!(err, DriverError::InvalidEventPayload(_)));

    drop(client);
    host.stop().unwrap();
}
