//! Transport behavior: malformed input, timeouts, reconnects and unload

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use synthd_core::control::{Response, MAX_REQUEST_BYTES};
use synthd_core::testing::{HostLoop, HostThread};
use synthd_core::video::VideoState;
use synthd_core::{ControlClient, DriverError, ErrorKind};

use crate::test_config;

fn read_response(reader: &mut BufReader<UnixStream>) -> Response {
    let mut line = String::new();
    reader.read_line(&mut line).expect("Failed to read response");
    serde_json::from_str(&line).expect("Response is not JSON")
}

/// Garbage gets an error response and the connection keeps working
#[test]
fn test_malformed_lines_are_answered() {
    let config = test_config();
    let host = HostThread::spawn(config.clone(), |host| host.boot()).expect("Failed to start host");

    let mut stream = UnixStream::connect(&config.socket_path).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    stream.write_all(b"this is not json\n").unwrap();
    let response = read_response(&mut reader);
    assert!(matches!(
        response,
        Response::Error {
            seq: 0,
            kind: ErrorKind::MalformedRequest,
            ..
        }
    ));

    // Recognizable seq, unknown operation
    stream
        .write_all(b"{\"seq\":41,\"target\":\"video\",\"op\":{\"name\":\"rotate\"}}\n")
        .unwrap();
    let response = read_response(&mut reader);
    assert_eq!(response.seq(), 41);
    assert!(matches!(
        response,
        Response::Error {
            kind: ErrorKind::MalformedRequest,
            ..
        }
    ));

    // Oversized line, then a good request on the same connection
    let mut big = vec![b'x'; MAX_REQUEST_BYTES + 1];
    big.push(b'\n');
    stream.write_all(&big).unwrap();
    let response = read_response(&mut reader);
    assert!(matches!(
        response,
        Response::Error {
            kind: ErrorKind::MalformedRequest,
            ..
        }
    ));

    stream
        .write_all(b"{\"seq\":42,\"target\":\"driver\",\"op\":{\"name\":\"status\"}}\n")
        .unwrap();
    let response = read_response(&mut reader);
    assert_eq!(response.seq(), 42);
    assert!(matches!(response, Response::Ok { .. }));

    drop(stream);
    host.stop().unwrap();
}

/// A driver that never dispatches makes the harness time out, not hang
#[test]
fn test_undispatched_driver_times_out() {
    let config = test_config().with_request_timeout(Duration::from_millis(200));
    let _host = HostLoop::new(&config).expect("Failed to create host loop");

    let err = ControlClient::connect(&config).err().unwrap();
    assert!(matches!(err, DriverError::ChannelTimeout(_)));
}

/// A second harness connection replaces the first
#[test]
fn test_reconnect_replaces_previous_harness() {
    let config = test_config();
    let host = HostThread::spawn(config.clone(), |host| host.boot()).expect("Failed to start host");

    let mut first = ControlClient::connect(&config).expect("Failed to connect");
    first.status().unwrap();

    let mut second = ControlClient::connect(&config).expect("Failed to reconnect");
    assert_eq!(second.status().unwrap().video, VideoState::ScreenInitialized);

    let err = first.status().unwrap_err();
    assert!(matches!(err, DriverError::ChannelClosed(_)), "{:?}", err);
    assert!(first.is_closed());

    drop(second);
    host.stop().unwrap();
}

/// Unloading the module closes the channel under the harness
#[test]
fn test_unload_closes_channel() {
    let config = test_config();
    let host = HostThread::spawn(config.clone(), |host| host.boot()).expect("Failed to start host");
    let mut client = ControlClient::connect(&config).expect("Failed to connect");

    let recorded = host.stop().unwrap();
    assert!(recorded.registered_devices().is_empty());
    assert!(!config.socket_path.exists());

    let err = client.status().unwrap_err();
    assert!(matches!(err, DriverError::ChannelClosed(_)), "{:?}", err);
    assert!(matches!(
        client.status(),
        Err(DriverError::ChannelClosed(_))
    ));
}

/// Closing the client is final
#[test]
fn test_closed_client_refuses_requests() {
    let config = test_config();
    let host = HostThread::spawn(config.clone(), |host| host.boot()).expect("Failed to start host");
    let mut client = ControlClient::connect(&config).expect("Failed to connect");

    client.close();
    client.close();
    assert!(matches!(
        client.modes(),
        Err(DriverError::ChannelClosed(_))
    ));

    host.stop().unwrap();
}
