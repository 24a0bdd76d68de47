//! Event loop standing in for the server's main loop

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use calloop::{EventLoop, LoopSignal};
use tracing::info;

use super::RecordingHost;
use crate::config::ControlConfig;
use crate::control;
use crate::driver::DriverState;
use crate::input::DeviceKind;
use crate::video::VideoState;

/// A loaded module with its control channel registered on a calloop loop
///
/// Requests are answered only while the loop is dispatched.
pub struct HostLoop {
    event_loop: EventLoop<'static, DriverState<RecordingHost>>,
    state: DriverState<RecordingHost>,
    auto_present: bool,
}

impl HostLoop {
    pub fn new(config: &ControlConfig) -> anyhow::Result<Self> {
        let event_loop: EventLoop<DriverState<RecordingHost>> =
            EventLoop::try_new().context("creating event loop")?;
        let state = DriverState::load(config, RecordingHost::new())?;
        control::watch(&event_loop.handle(), &state)?;

        Ok(Self {
            event_loop,
            state,
            auto_present: false,
        })
    }

    /// What a server does on startup: probe, init the screen, and bring up
    /// one default keyboard and one default pointer.
    pub fn boot(&mut self) -> anyhow::Result<()> {
        self.state.video_probe()?;
        self.state.video_screen_init()?;
        self.state.input_device_init(DeviceKind::Keyboard)?;
        self.state.input_device_init(DeviceKind::Pointer)?;
        info!("Host booted");
        Ok(())
    }

    pub fn state(&self) -> &DriverState<RecordingHost> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DriverState<RecordingHost> {
        &mut self.state
    }

    /// Present a frame on every loop iteration once the screen is up
    pub fn set_auto_present(&mut self, enabled: bool) {
        self.auto_present = enabled;
    }

    pub fn signal(&self) -> LoopSignal {
        self.event_loop.get_signal()
    }

    /// Run one loop iteration
    pub fn dispatch(&mut self) -> anyhow::Result<()> {
        self.event_loop
            .dispatch(Some(Duration::from_millis(10)), &mut self.state)?;
        Ok(())
    }

    /// Dispatch until the loop signal is stopped
    pub fn run(&mut self) -> anyhow::Result<()> {
        let auto_present = self.auto_present;
        self.event_loop
            .run(Duration::from_millis(50), &mut self.state, |state| {
                if auto_present
                    && matches!(
                        state.video().state(),
                        VideoState::ScreenInitialized | VideoState::Active
                    )
                {
                    let _ = state.video_present();
                }
            })?;
        Ok(())
    }

    /// Unload the module and return what the server saw
    pub fn finish(mut self) -> RecordingHost {
        self.state.unload();
        self.state.host().clone()
    }
}

/// A [`HostLoop`] running on its own thread
pub struct HostThread {
    signal: LoopSignal,
    handle: JoinHandle<anyhow::Result<RecordingHost>>,
}

impl HostThread {
    /// Load the module on a new thread, run `setup` there, then start
    /// dispatching. Returns once the control socket is bound.
    pub fn spawn<F>(config: ControlConfig, setup: F) -> anyhow::Result<Self>
    where
        F: FnOnce(&mut HostLoop) -> anyhow::Result<()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("synthd-host".to_string())
            .spawn(move || {
                let ready = HostLoop::new(&config).and_then(|mut host_loop| {
                    setup(&mut host_loop)?;
                    Ok(host_loop)
                });
                let mut host_loop = match ready {
                    Ok(host_loop) => host_loop,
                    Err(e) => {
                        let _ = tx.send(Err(format!("{:#}", e)));
                        return Err(e);
                    }
                };
                let _ = tx.send(Ok(host_loop.signal()));
                host_loop.run()?;
                Ok(host_loop.finish())
            })?;

        match rx.recv() {
            Ok(Ok(signal)) => Ok(Self { signal, handle }),
            Ok(Err(message)) => {
                let _ = handle.join();
                bail!("host setup failed: {}", message)
            }
            Err(_) => {
                let _ = handle.join();
                bail!("host thread exited during setup")
            }
        }
    }

    /// Stop the loop, unload the module and return what the server saw.
    pub fn stop(self) -> anyhow::Result<RecordingHost> {
        self.signal.stop();
        self.signal.wakeup();
        self.handle
            .join()
            .map_err(|_| anyhow!("host thread panicked"))?
    }
}
