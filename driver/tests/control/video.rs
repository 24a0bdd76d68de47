//! Video driver behavior as seen by the harness

use proptest::prelude::*;
use synthd_core::control::{Operation, Payload, Request};
use synthd_core::testing::{unique_socket_path, RecordingHost};
use synthd_core::video::{FillPattern, PixelFormat, ScreenConfig, VideoState, REFRESH_RANGE_MHZ};
use synthd_core::{ControlConfig, DriverError, DriverState};

use crate::booted;

fn set(state: &mut DriverState<RecordingHost>, config: ScreenConfig) -> Result<Payload, DriverError> {
    state
        .dispatch(Request::new(1, Operation::SetScreenConfig { config }))
        .into_result()
}

fn get(state: &mut DriverState<RecordingHost>) -> Result<Payload, DriverError> {
    state
        .dispatch(Request::new(2, Operation::GetScreenConfig))
        .into_result()
}

fn format() -> impl Strategy<Value = PixelFormat> {
    prop_oneof![
        Just(PixelFormat::X8r8g8b8),
        Just(PixelFormat::A8r8g8b8),
        Just(PixelFormat::R5g6b5),
    ]
}

fn in_bounds_config() -> impl Strategy<Value = ScreenConfig> {
    (1u32..=4096, 1u32..=4096, REFRESH_RANGE_MHZ, format()).prop_map(
        |(width, height, refresh_mhz, format)| ScreenConfig {
            width,
            height,
            refresh_mhz,
            format,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever is set before the screen goes active is read back unchanged
    #[test]
    fn prop_screen_config_round_trips(config in in_bounds_config(), probed in any::<bool>()) {
        let mut state = DriverState::load(
            &ControlConfig::new(unique_socket_path()),
            RecordingHost::new(),
        ).unwrap();
        if probed {
            state.video_probe().unwrap();
        }

        prop_assert_eq!(set(&mut state, config).unwrap(), Payload::ScreenConfig(config));
        prop_assert_eq!(get(&mut state).unwrap(), Payload::ScreenConfig(config));
    }
}

#[test]
fn test_out_of_bounds_config_is_refused() {
    let mut state =
        DriverState::load(&ControlConfig::new(unique_socket_path()), RecordingHost::new()).unwrap();

    for config in [
        ScreenConfig {
            width: 0,
            ..ScreenConfig::default()
        },
        ScreenConfig {
            width: 8193,
            ..ScreenConfig::default()
        },
        ScreenConfig {
            width: 8192,
            height: 8192,
            ..ScreenConfig::default()
        },
    ] {
        let err = set(&mut state, config).unwrap_err();
        assert!(
            matches!(err, DriverError::AllocationFailed(_)),
            "{:?} gave {:?}",
            config,
            err
        );
    }
    assert_eq!(
        get(&mut state).unwrap(),
        Payload::ScreenConfig(ScreenConfig::default())
    );
}

/// Two dumps with no fill in between are byte-identical
#[test]
fn test_dump_is_stable() {
    let (host, mut client) = booted();
    client
        .fill(FillPattern::Checkerboard {
            cell: 8,
            a: 0x00ff_0000,
            b: 0x0000_00ff,
        })
        .unwrap();

    let first = client.dump_frame_buffer().unwrap();
    let second = client.dump_frame_buffer().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.argb(0, 0), Some(0xffff_0000));
    assert_eq!(first.argb(8, 0), Some(0xff00_00ff));

    drop(client);
    let recorded = host.stop().unwrap();
    assert_eq!(recorded.damage_log().len(), 1);
}

#[test]
fn test_fill_then_dump_reads_back_pattern() {
    let (host, mut client) = booted();
    client.fill(FillPattern::Solid { color: 0x0012_3456 }).unwrap();

    let dump = client.dump_frame_buffer().unwrap();
    assert_eq!(dump.argb(0, 0), Some(0xff12_3456));
    assert_eq!(dump.argb(dump.width - 1, dump.height - 1), Some(0xff12_3456));

    drop(client);
    host.stop().unwrap();
}

#[test]
fn test_reconfigure_refused_after_present() {
    let config = crate::test_config();
    let host = synthd_core::testing::HostThread::spawn(config.clone(), |host| {
        host.boot()?;
        host.set_auto_present(true);
        Ok(())
    })
    .expect("Failed to start host");
    let mut client = synthd_core::ControlClient::connect(&config).expect("Failed to connect");

    // The loop presents on every iteration, so by the time the hello was
    // answered the screen is active
    let status = client.status().unwrap();
    assert_eq!(status.video, VideoState::Active);

    let err = client
        .set_screen_config(ScreenConfig {
            width: 640,
            height: 480,
            ..ScreenConfig::default()
        })
        .unwrap_err();
    assert!(matches!(err, DriverError::ReconfigureNotSupported(_)));
    assert_eq!(client.screen_config().unwrap(), ScreenConfig::default());

    drop(client);
    host.stop().unwrap();
}

#[test]
fn test_modes_list_preferred_first() {
    let (host, mut client) = booted();
    let modes = client.modes().unwrap();
    assert!(modes[0].preferred);
    assert_eq!((modes[0].width, modes[0].height), (1024, 768));
    assert_eq!(modes.iter().filter(|m| m.preferred).count(), 1);

    drop(client);
    host.stop().unwrap();
}
