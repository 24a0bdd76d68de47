//! Loadable module surface
//!
//! The server loads `libsynthd_core.so` through a thin shim and calls the
//! `synthd_*` functions below. The shim hands us a [`SynthdHostVTable`] on
//! load; every call back into the server goes through it.
//!
//! All entry points are meant to be called from the server's main thread.
//! None of them unwind into the caller: panics are caught and reported as a
//! negative status. Vtable functions must not call back into the module.

use std::ffi::{c_char, c_int, c_void, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use tracing::{error, info, warn};

use crate::config::ControlConfig;
use crate::driver::DriverState;
use crate::error::{DriverError, ErrorKind};
use crate::host::{DriverKind, Host, HostDeviceHandle, HostRejection, Rect};
use crate::input::{Axis, CapabilitySet, DeviceEvent, DeviceId, DeviceKind, ScrollAxis};
use crate::video::ScreenInfo;

pub const SYNTHD_DRIVER_VIDEO: u32 = 0;
pub const SYNTHD_DRIVER_INPUT: u32 = 1;

pub const SYNTHD_DEVICE_KEYBOARD: u32 = 0;
pub const SYNTHD_DEVICE_POINTER: u32 = 1;

pub const SYNTHD_EVENT_KEY: u32 = 0;
pub const SYNTHD_EVENT_BUTTON: u32 = 1;
pub const SYNTHD_EVENT_MOTION: u32 = 2;
pub const SYNTHD_EVENT_MOTION_ABSOLUTE: u32 = 3;
pub const SYNTHD_EVENT_SCROLL_VERTICAL: u32 = 4;
pub const SYNTHD_EVENT_SCROLL_HORIZONTAL: u32 = 5;

/// Callbacks into the server, supplied once at load
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SynthdHostVTable {
    pub ctx: *mut c_void,
    pub add_driver: extern "C" fn(ctx: *mut c_void, kind: u32, name: *const c_char),
    /// Returns 0 and writes the server's handle on success.
    pub register_device: extern "C" fn(
        ctx: *mut c_void,
        name: *const c_char,
        kind: u32,
        caps: *const SynthdCapabilities,
        handle: *mut u64,
    ) -> c_int,
    pub unregister_device: extern "C" fn(ctx: *mut c_void, handle: u64),
    /// Returns 0 once the server has queued the event.
    pub post_event: extern "C" fn(ctx: *mut c_void, handle: u64, event: *const SynthdEvent) -> c_int,
    pub damage: extern "C" fn(ctx: *mut c_void, x: u32, y: u32, width: u32, height: u32),
}

#[repr(C)]
pub struct SynthdCapabilities {
    pub keys: *const u32,
    pub n_keys: usize,
    pub buttons: *const u32,
    pub n_buttons: usize,
    /// Bit per axis, see [`axis_bit`]
    pub axes: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SynthdEvent {
    pub kind: u32,
    /// Keycode or button
    pub code: u32,
    pub pressed: u32,
    pub x: i32,
    pub y: i32,
    pub delta: f64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SynthdMode {
    pub width: u32,
    pub height: u32,
    pub refresh_mhz: u32,
    pub preferred: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SynthdScreenInfo {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub depth: u32,
    pub bits_per_pixel: u32,
    pub refresh_mhz: u32,
}

impl From<ScreenInfo> for SynthdScreenInfo {
    fn from(info: ScreenInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            stride: info.stride as u32,
            depth: info.depth,
            bits_per_pixel: info.bits_per_pixel,
            refresh_mhz: info.refresh_mhz,
        }
    }
}

pub fn axis_bit(axis: Axis) -> u32 {
    1 << match axis {
        Axis::RelX => 0,
        Axis::RelY => 1,
        Axis::AbsX => 2,
        Axis::AbsY => 3,
        Axis::ScrollVertical => 4,
        Axis::ScrollHorizontal => 5,
    }
}

fn device_kind_code(kind: DeviceKind) -> u32 {
    match kind {
        DeviceKind::Keyboard => SYNTHD_DEVICE_KEYBOARD,
        DeviceKind::Pointer => SYNTHD_DEVICE_POINTER,
    }
}

impl From<&DeviceEvent> for SynthdEvent {
    fn from(event: &DeviceEvent) -> Self {
        let mut out = SynthdEvent::default();
        match *event {
            DeviceEvent::Key { keycode, pressed } => {
                out.kind = SYNTHD_EVENT_KEY;
                out.code = keycode;
                out.pressed = pressed as u32;
            }
            DeviceEvent::Button { button, pressed } => {
                out.kind = SYNTHD_EVENT_BUTTON;
                out.code = button;
                out.pressed = pressed as u32;
            }
            DeviceEvent::Motion { dx, dy } => {
                out.kind = SYNTHD_EVENT_MOTION;
                out.x = dx;
                out.y = dy;
            }
            DeviceEvent::MotionAbsolute { x, y } => {
                out.kind = SYNTHD_EVENT_MOTION_ABSOLUTE;
                out.x = x as i32;
                out.y = y as i32;
            }
            DeviceEvent::Scroll { axis, delta } => {
                out.kind = match axis {
                    ScrollAxis::Vertical => SYNTHD_EVENT_SCROLL_VERTICAL,
                    ScrollAxis::Horizontal => SYNTHD_EVENT_SCROLL_HORIZONTAL,
                };
                out.delta = delta;
            }
        }
        out
    }
}

/// [`Host`] backed by the server's vtable
pub struct FfiHost {
    vtable: SynthdHostVTable,
}

// SAFETY: the server calls every entry point from its main thread, so the
// context pointer is only ever used on that thread.
unsafe impl Send for FfiHost {}

fn c_name(name: &str) -> CString {
    CString::new(name.replace('\0', "")).unwrap_or_default()
}

impl Host for FfiHost {
    fn add_driver(&mut self, kind: DriverKind, name: &str) {
        let kind = match kind {
            DriverKind::Video => SYNTHD_DRIVER_VIDEO,
            DriverKind::Input => SYNTHD_DRIVER_INPUT,
        };
        let name = c_name(name);
        (self.vtable.add_driver)(self.vtable.ctx, kind, name.as_ptr());
    }

    fn register_input_device(
        &mut self,
        name: &str,
        kind: DeviceKind,
        capabilities: &CapabilitySet,
    ) -> Result<HostDeviceHandle, HostRejection> {
        let keys: Vec<u32> = capabilities.keys.iter().copied().collect();
        let buttons: Vec<u32> = capabilities.buttons.iter().copied().collect();
        let caps = SynthdCapabilities {
            keys: keys.as_ptr(),
            n_keys: keys.len(),
            buttons: buttons.as_ptr(),
            n_buttons: buttons.len(),
            axes: capabilities.axes.iter().fold(0, |bits, &a| bits | axis_bit(a)),
        };
        let name = c_name(name);
        let mut handle = 0u64;
        let status = (self.vtable.register_device)(
            self.vtable.ctx,
            name.as_ptr(),
            device_kind_code(kind),
            &caps,
            &mut handle,
        );
        if status != 0 {
            return Err(HostRejection(format!("status {}", status)));
        }
        Ok(HostDeviceHandle(handle))
    }

    fn unregister_input_device(&mut self, handle: HostDeviceHandle) {
        (self.vtable.unregister_device)(self.vtable.ctx, handle.0);
    }

    fn post_input_event(
        &mut self,
        handle: HostDeviceHandle,
        event: &DeviceEvent,
    ) -> Result<(), HostRejection> {
        let event = SynthdEvent::from(event);
        match (self.vtable.post_event)(self.vtable.ctx, handle.0, &event) {
            0 => Ok(()),
            status => Err(HostRejection(format!("status {}", status))),
        }
    }

    fn damage(&mut self, area: Rect) {
        (self.vtable.damage)(self.vtable.ctx, area.x, area.y, area.width, area.height);
    }
}

static DRIVER: OnceLock<Mutex<Option<DriverState<FfiHost>>>> = OnceLock::new();

/// Set when a panic was caught; cleared by unload or a fresh load
static FAILED: AtomicBool = AtomicBool::new(false);

fn driver_slot() -> MutexGuard<'static, Option<DriverState<FfiHost>>> {
    let slot = DRIVER.get_or_init(|| Mutex::new(None));
    // A caught panic poisons the lock and may have left the state half-updated.
    // Only unload touches it after that, see FAILED.
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Negative errno for a driver error
fn status(err: &DriverError) -> c_int {
    let errno = match err.kind() {
        ErrorKind::ChannelUnavailable => libc::ECONNREFUSED,
        ErrorKind::ChannelClosed => libc::EPIPE,
        ErrorKind::ChannelTimeout => libc::ETIMEDOUT,
        ErrorKind::MalformedRequest | ErrorKind::InvalidEventPayload => libc::EINVAL,
        ErrorKind::UnsupportedOperation => libc::EOPNOTSUPP,
        ErrorKind::AllocationFailed => libc::ENOMEM,
        ErrorKind::ReconfigureNotSupported => libc::EBUSY,
        ErrorKind::DeviceRegistrationFailed => libc::ENODEV,
    };
    -errno
}

/// Run an entry point without letting a panic cross the FFI boundary.
fn guarded(name: &str, f: impl FnOnce() -> c_int) -> c_int {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            error!("{} panicked, refusing further calls until unload", name);
            FAILED.store(true, Ordering::SeqCst);
            -libc::EFAULT
        }
    }
}

fn with_driver(
    name: &str,
    f: impl FnOnce(&mut DriverState<FfiHost>) -> Result<c_int, DriverError>,
) -> c_int {
    guarded(name, || {
        if FAILED.load(Ordering::SeqCst) {
            warn!("{} refused, module failed earlier", name);
            return -libc::EFAULT;
        }
        let mut slot = driver_slot();
        let Some(state) = slot.as_mut() else {
            warn!("{} called while not loaded", name);
            return -libc::ENXIO;
        };
        match f(state) {
            Ok(status) => status,
            Err(e) => {
                warn!("{} failed: {}", name, e);
                status(&e)
            }
        }
    })
}

fn init_logging() {
    use std::sync::Once;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    static INIT_LOG: Once = Once::new();
    INIT_LOG.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("synthd=debug"));

        // Journald when available, stderr otherwise
        if let Ok(journald) = tracing_journald::layer() {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(journald.with_syslog_identifier("synthd".to_string()))
                .try_init();
        } else {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    });
}

/// Load the module. Returns 0, or a negative errno if the control channel
/// cannot be bound or the module is already loaded.
///
/// # Safety
///
/// `vtable` must point to a valid vtable whose functions stay callable with
/// its `ctx` until [`synthd_module_unload`] returns.
#[no_mangle]
pub unsafe extern "C" fn synthd_module_load(vtable: *const SynthdHostVTable) -> c_int {
    init_logging();
    if vtable.is_null() {
        error!("synthd_module_load called without a host vtable");
        return -libc::EINVAL;
    }
    // SAFETY: non-null and valid per the caller contract
    let vtable = unsafe { *vtable };

    guarded("synthd_module_load", || {
        let mut slot = driver_slot();
        if slot.is_some() {
            warn!("synthd already loaded");
            return -libc::EALREADY;
        }
        let config = ControlConfig::from_env();
        match DriverState::load(&config, FfiHost { vtable }) {
            Ok(state) => {
                *slot = Some(state);
                FAILED.store(false, Ordering::SeqCst);
                0
            }
            Err(e) => {
                error!("synthd failed to load: {}", e);
                status(&e)
            }
        }
    })
}

#[no_mangle]
pub extern "C" fn synthd_module_unload() {
    guarded("synthd_module_unload", || {
        let state = driver_slot().take();
        FAILED.store(false, Ordering::SeqCst);
        if let Some(mut state) = state {
            state.unload();
        }
        0
    });
}

/// Write up to `capacity` modes to `modes` and return how many the monitor
/// reports in total.
///
/// # Safety
///
/// `modes` must be valid for `capacity` writes, or null with `capacity` 0.
#[no_mangle]
pub unsafe extern "C" fn synthd_video_probe(modes: *mut SynthdMode, capacity: usize) -> c_int {
    with_driver("synthd_video_probe", |state| {
        let list = state.video_probe()?;
        for (i, mode) in list.iter().take(capacity).enumerate() {
            let out = SynthdMode {
                width: mode.width,
                height: mode.height,
                refresh_mhz: mode.refresh_mhz,
                preferred: mode.preferred as u32,
            };
            // SAFETY: i < capacity and the caller guarantees room
            unsafe { modes.add(i).write(out) };
        }
        Ok(list.len() as c_int)
    })
}

/// # Safety
///
/// `info` must be null or valid for one write.
#[no_mangle]
pub unsafe extern "C" fn synthd_video_screen_init(info: *mut SynthdScreenInfo) -> c_int {
    with_driver("synthd_video_screen_init", |state| {
        let screen = state.video_screen_init()?;
        if !info.is_null() {
            // SAFETY: non-null and valid per the caller contract
            unsafe { info.write(screen.into()) };
        }
        Ok(0)
    })
}

/// Expose the framebuffer read-only. The pointer and the geometry from
/// [`synthd_video_screen_init`] stay valid until [`synthd_video_close_screen`]
/// or [`synthd_module_unload`]; the harness cannot reconfigure the screen in
/// between.
///
/// # Safety
///
/// `data` and `len` must be valid for one write each.
#[no_mangle]
pub unsafe extern "C" fn synthd_video_framebuffer(data: *mut *const u8, len: *mut usize) -> c_int {
    if data.is_null() || len.is_null() {
        return -libc::EINVAL;
    }
    with_driver("synthd_video_framebuffer", |state| {
        let pixels = state.video_framebuffer()?.pixels();
        // SAFETY: both checked non-null above
        unsafe {
            data.write(pixels.as_ptr());
            len.write(pixels.len());
        }
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn synthd_video_present() -> c_int {
    with_driver("synthd_video_present", |state| {
        state.video_present()?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn synthd_video_close_screen() {
    with_driver("synthd_video_close_screen", |state| {
        state.video_close_screen();
        Ok(0)
    });
}

/// Bring up a default device of `kind`. Returns the device id.
#[no_mangle]
pub extern "C" fn synthd_input_device_init(kind: u32) -> c_int {
    with_driver("synthd_input_device_init", |state| {
        let kind = match kind {
            SYNTHD_DEVICE_KEYBOARD => DeviceKind::Keyboard,
            SYNTHD_DEVICE_POINTER => DeviceKind::Pointer,
            other => {
                return Err(DriverError::DeviceRegistrationFailed(format!(
                    "unknown device kind {}",
                    other
                )))
            }
        };
        let id = state.input_device_init(kind)?;
        Ok(id.0 as c_int)
    })
}

#[no_mangle]
pub extern "C" fn synthd_input_device_close(id: u32) -> c_int {
    with_driver("synthd_input_device_close", |state| {
        state.input_device_close(DeviceId(id))?;
        Ok(0)
    })
}

/// Write up to `capacity` descriptors the server should poll for
/// readability. Returns the total count.
///
/// # Safety
///
/// `fds` must be valid for `capacity` writes, or null with `capacity` 0.
#[no_mangle]
pub unsafe extern "C" fn synthd_control_fds(fds: *mut c_int, capacity: usize) -> c_int {
    with_driver("synthd_control_fds", |state| {
        let all = state.control_fds();
        for (i, fd) in all.iter().take(capacity).enumerate() {
            // SAFETY: i < capacity and the caller guarantees room
            unsafe { fds.add(i).write(*fd) };
        }
        Ok(all.len() as c_int)
    })
}

/// One of the control descriptors became readable. Accepts a waiting harness
/// and answers everything it has sent.
#[no_mangle]
pub extern "C" fn synthd_control_ready() -> c_int {
    with_driver("synthd_control_ready", |state| {
        if state.accept_control().is_some() {
            info!("Harness attached via module poll");
        }
        state.service_control();
        Ok(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_CONTROL_SOCKET;
    use crate::testing::unique_socket_path;
    use crate::video::DEFAULT_FILL;
    use std::ffi::CStr;

    /// The entry points share one process-wide slot
    static MODULE_LOCK: Mutex<()> = Mutex::new(());

    fn exclusive() -> MutexGuard<'static, ()> {
        MODULE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    struct RecordedDevice {
        name: String,
        kind: u32,
        keys: Vec<u32>,
        buttons: Vec<u32>,
        axes: u32,
        handle: u64,
    }

    /// What the server saw through the vtable
    #[derive(Default)]
    struct Recorder {
        drivers: Vec<(u32, String)>,
        devices: Vec<RecordedDevice>,
        unregistered: Vec<u64>,
        events: Vec<(u64, SynthdEvent)>,
        damage: Vec<(u32, u32, u32, u32)>,
    }

    fn recorder<'a>(ctx: *mut c_void) -> &'a mut Recorder {
        unsafe { &mut *(ctx as *mut Recorder) }
    }

    fn array(ptr: *const u32, len: usize) -> Vec<u32> {
        if len == 0 {
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec()
    }

    extern "C" fn record_driver(ctx: *mut c_void, kind: u32, name: *const c_char) {
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
        recorder(ctx).drivers.push((kind, name));
    }

    extern "C" fn record_device(
        ctx: *mut c_void,
        name: *const c_char,
        kind: u32,
        caps: *const SynthdCapabilities,
        handle: *mut u64,
    ) -> c_int {
        let rec = recorder(ctx);
        let caps = unsafe { &*caps };
        let assigned = 100 + rec.devices.len() as u64;
        rec.devices.push(RecordedDevice {
            name: unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned(),
            kind,
            keys: array(caps.keys, caps.n_keys),
            buttons: array(caps.buttons, caps.n_buttons),
            axes: caps.axes,
            handle: assigned,
        });
        unsafe { handle.write(assigned) };
        0
    }

    extern "C" fn record_unregister(ctx: *mut c_void, handle: u64) {
        recorder(ctx).unregistered.push(handle);
    }

    extern "C" fn record_event(ctx: *mut c_void, handle: u64, event: *const SynthdEvent) -> c_int {
        recorder(ctx).events.push((handle, unsafe { *event }));
        0
    }

    extern "C" fn record_damage(ctx: *mut c_void, x: u32, y: u32, width: u32, height: u32) {
        recorder(ctx).damage.push((x, y, width, height));
    }

    fn recording_vtable(rec: *mut Recorder) -> SynthdHostVTable {
        SynthdHostVTable {
            ctx: rec as *mut c_void,
            add_driver: record_driver,
            register_device: record_device,
            unregister_device: record_unregister,
            post_event: record_event,
            damage: record_damage,
        }
    }

    #[test]
    fn test_module_lifecycle_through_c_abi() {
        let _lock = exclusive();
        let socket = unique_socket_path();
        std::env::set_var(ENV_CONTROL_SOCKET, &socket);
        let rec = Box::into_raw(Box::<Recorder>::default());
        let vtable = recording_vtable(rec);

        unsafe {
            assert_eq!(synthd_module_load(&vtable), 0);
            assert!(socket.exists());
            assert_eq!(synthd_module_load(&vtable), -libc::EALREADY);

            // Room for two, told about all five
            let mut modes = [SynthdMode::default(); 2];
            assert_eq!(synthd_video_probe(modes.as_mut_ptr(), modes.len()), 5);
            assert_eq!(
                (modes[0].width, modes[0].height, modes[0].preferred),
                (1024, 768, 1)
            );
            assert_eq!(
                (modes[1].width, modes[1].height, modes[1].preferred),
                (1920, 1080, 0)
            );

            let mut info = SynthdScreenInfo::default();
            assert_eq!(synthd_video_screen_init(&mut info), 0);
            assert_eq!((info.width, info.height, info.stride), (1024, 768, 4096));

            let mut data = std::ptr::null();
            let mut len = 0usize;
            assert_eq!(synthd_video_framebuffer(&mut data, &mut len), 0);
            assert!(!data.is_null());
            assert_eq!(len, 4096 * 768);
            assert!(std::slice::from_raw_parts(data, len)
                .iter()
                .all(|&b| b == DEFAULT_FILL));
        }

        assert_eq!(synthd_input_device_init(SYNTHD_DEVICE_KEYBOARD), 1);
        assert_eq!(synthd_input_device_init(7), -libc::ENODEV);
        assert_eq!(synthd_video_present(), 0);

        synthd_module_unload();
        synthd_module_unload();
        assert!(!socket.exists());
        assert_eq!(synthd_video_present(), -libc::ENXIO);
        std::env::remove_var(ENV_CONTROL_SOCKET);

        let rec = unsafe { Box::from_raw(rec) };
        assert_eq!(
            rec.drivers,
            vec![
                (SYNTHD_DRIVER_VIDEO, "synthd".to_string()),
                (SYNTHD_DRIVER_INPUT, "synthd-input".to_string()),
            ]
        );
        assert_eq!(rec.devices.len(), 1);
        let keyboard = &rec.devices[0];
        assert_eq!(keyboard.kind, SYNTHD_DEVICE_KEYBOARD);
        assert_eq!(keyboard.name, "synthd-keyboard-1");
        assert_eq!(keyboard.keys, (8..=255).collect::<Vec<u32>>());
        assert!(keyboard.buttons.is_empty());
        assert_eq!(keyboard.axes, 0);
        assert_eq!(rec.unregistered, vec![keyboard.handle]);
        assert!(rec.events.is_empty());
        assert!(rec.damage.is_empty());
    }

    #[test]
    fn test_caught_panic_fails_module_until_unload() {
        let _lock = exclusive();
        let socket = unique_socket_path();
        std::env::set_var(ENV_CONTROL_SOCKET, &socket);
        let rec = Box::into_raw(Box::<Recorder>::default());
        let vtable = recording_vtable(rec);
        assert_eq!(unsafe { synthd_module_load(&vtable) }, 0);

        assert_eq!(with_driver("test", |_| panic!("mid-update")), -libc::EFAULT);
        assert_eq!(synthd_video_present(), -libc::EFAULT);
        assert_eq!(
            synthd_input_device_init(SYNTHD_DEVICE_POINTER),
            -libc::EFAULT
        );

        synthd_module_unload();
        assert!(!socket.exists());
        assert_eq!(synthd_video_present(), -libc::ENXIO);

        // A fresh load starts clean
        assert_eq!(unsafe { synthd_module_load(&vtable) }, 0);
        assert_eq!(synthd_input_device_init(SYNTHD_DEVICE_POINTER), 1);
        synthd_module_unload();
        std::env::remove_var(ENV_CONTROL_SOCKET);

        let rec = unsafe { Box::from_raw(rec) };
        assert_eq!(rec.devices.len(), 1);
        assert_eq!(rec.devices[0].kind, SYNTHD_DEVICE_POINTER);
        assert_eq!(rec.devices[0].buttons, (1..=9).collect::<Vec<u32>>());
        assert_eq!(rec.devices[0].axes, 0b11_1111);
    }

    #[test]
    fn test_axis_bits_are_distinct() {
        let all = CapabilitySet::default_for(DeviceKind::Pointer);
        let bits = all.axes.iter().fold(0, |acc, &a| acc | axis_bit(a));
        assert_eq!(bits, 0b11_1111);
    }

    #[test]
    fn test_event_conversion() {
        let event = SynthdEvent::from(&DeviceEvent::Key {
            keycode: 38,
            pressed: true,
        });
        assert_eq!((event.kind, event.code, event.pressed), (SYNTHD_EVENT_KEY, 38, 1));

        let event = SynthdEvent::from(&DeviceEvent::Scroll {
            axis: ScrollAxis::Horizontal,
            delta: -1.5,
        });
        assert_eq!(event.kind, SYNTHD_EVENT_SCROLL_HORIZONTAL);
        assert_eq!(event.delta, -1.5);
    }

    #[test]
    fn test_errors_map_to_negative_errno() {
        assert_eq!(
            status(&DriverError::AllocationFailed("big".into())),
            -libc::ENOMEM
        );
        assert!(status(&DriverError::ChannelClosed(String::new())) < 0);
    }

    #[test]
    fn test_entry_points_refuse_when_not_loaded() {
        let _lock = exclusive();
        assert_eq!(synthd_video_present(), -libc::ENXIO);
    }
}
