//! What each message looks like on the socket
//!
//! Harnesses in other languages parse these lines, so any change here is a
//! protocol change.

use insta::assert_snapshot;
use synthd_core::control::{Operation, Payload, Request, Response};
use synthd_core::input::{Accepted, Capabilities, DeviceId, DeviceKind, InputEvent};
use synthd_core::video::{FillPattern, ScreenConfig};
use synthd_core::DriverError;

fn line<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap()
}

#[test]
fn test_request_lines() {
    assert_snapshot!(line(&Request::new(1, Operation::Status)), @r#"{"seq":1,"target":"driver","op":{"name":"status"}}"#);

    let config = ScreenConfig {
        width: 64,
        height: 64,
        ..ScreenConfig::default()
    };
    assert_snapshot!(
        line(&Request::new(2, Operation::SetScreenConfig { config })),
        @r#"{"seq":2,"target":"video","op":{"name":"set-screen-config","args":{"config":{"width":64,"height":64,"refresh_mhz":60000,"format":"x8r8g8b8"}}}}"#
    );

    assert_snapshot!(
        line(&Request::new(3, Operation::Inject { device: DeviceId(1), event: InputEvent::key("a", true) })),
        @r#"{"seq":3,"target":"input","op":{"name":"inject","args":{"device":1,"event":{"type":"key","key":"a","pressed":true}}}}"#
    );

    assert_snapshot!(
        line(&Request::new(4, Operation::RegisterDevice { kind: DeviceKind::Keyboard, capabilities: Capabilities::keys(["a", "b"]) })),
        @r#"{"seq":4,"target":"input","op":{"name":"register-device","args":{"kind":"keyboard","capabilities":{"keys":["a","b"],"buttons":[],"axes":[]}}}}"#
    );

    assert_snapshot!(
        line(&Request::new(5, Operation::Fill { pattern: FillPattern::Checkerboard { cell: 8, a: 0, b: 16777215 } })),
        @r#"{"seq":5,"target":"video","op":{"name":"fill","args":{"pattern":{"kind":"checkerboard","cell":8,"a":0,"b":16777215}}}}"#
    );
}

#[test]
fn test_response_lines() {
    let accepted = Response::ok(
        3,
        Payload::Accepted(Accepted {
            device: DeviceId(1),
            serial: 1,
        }),
    );
    assert_snapshot!(line(&accepted), @r#"{"status":"ok","seq":3,"payload":{"type":"accepted","device":1,"serial":1}}"#);

    assert_snapshot!(
        line(&Response::ok(6, Payload::Empty)),
        @r#"{"status":"ok","seq":6,"payload":{"type":"empty"}}"#
    );

    let refused = Response::error(
        7,
        &DriverError::ReconfigureNotSupported("screen is active".into()),
    );
    assert_snapshot!(
        line(&refused),
        @r#"{"status":"error","seq":7,"kind":"ReconfigureNotSupported","message":"screen is active"}"#
    );
}

/// Lines written by hand, as a harness in another language would, decode
#[test]
fn test_handwritten_request_decodes() {
    let request = Request::decode(
        r#"{"seq":9,"target":"input","op":{"name":"inject","args":{"device":2,"event":{"type":"motion-absolute","x":5,"y":6}}}}"#,
    )
    .unwrap();
    assert_eq!(
        request.op,
        Operation::Inject {
            device: DeviceId(2),
            event: InputEvent::MotionAbsolute { x: 5, y: 6 },
        }
    );

    let request = Request::decode(
        r#"{"seq":10,"target":"input","op":{"name":"inject","args":{"device":2,"event":{"type":"key","key":38,"pressed":false}}}}"#,
    )
    .unwrap();
    assert_eq!(
        request.op,
        Operation::Inject {
            device: DeviceId(2),
            event: InputEvent::key(38u32, false),
        }
    );
}
