//! Video output driver
//!
//! A virtual monitor with a software framebuffer. The server drives it through
//! probe, screen init, present and close; the harness inspects and reshapes it
//! through the control channel.
//!
//! # Design Invariants
//!
//! 1. **No hardware access**: modes come from the current [`ScreenConfig`] and a
//!    fixed list, never from a real display.
//!
//! 2. **Stable contents**: presentation never touches pixels. Only a harness
//!    fill changes the framebuffer, so two dumps with nothing in between are
//!    byte-identical.
//!
//! 3. **Frozen after screen init**: the server caches the screen geometry and
//!    the framebuffer pointer from screen init, so reconfiguration is refused
//!    from `ScreenInitialized` onward. The buffer is never reallocated while
//!    the server may be reading it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DriverError, Result};
use crate::host::{Host, Rect};

/// Largest accepted width or height
pub const MAX_DIMENSION: u32 = 8192;
/// Largest accepted framebuffer
pub const MAX_FRAMEBUFFER_BYTES: usize = 128 * 1024 * 1024;
/// Accepted refresh range in mHz
pub const REFRESH_RANGE_MHZ: std::ops::RangeInclusive<u32> = 1_000..=480_000;

/// Byte value a freshly allocated framebuffer is filled with
pub const DEFAULT_FILL: u8 = 0;

/// Modes reported after the configured one, largest first
const STANDARD_MODES: [(u32, u32); 5] = [
    (1920, 1080),
    (1280, 720),
    (1024, 768),
    (800, 600),
    (640, 480),
];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    X8r8g8b8,
    A8r8g8b8,
    R5g6b5,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::X8r8g8b8 | PixelFormat::A8r8g8b8 => 4,
            PixelFormat::R5g6b5 => 2,
        }
    }

    pub fn depth(self) -> u32 {
        match self {
            PixelFormat::X8r8g8b8 => 24,
            PixelFormat::A8r8g8b8 => 32,
            PixelFormat::R5g6b5 => 16,
        }
    }

    pub fn bits_per_pixel(self) -> u32 {
        self.bytes_per_pixel() as u32 * 8
    }

    /// Pack a 0xAARRGGBB color into this format's little-endian bytes.
    fn pack(self, argb: u32, out: &mut [u8]) {
        match self {
            PixelFormat::X8r8g8b8 => out.copy_from_slice(&(argb & 0x00ff_ffff).to_le_bytes()),
            PixelFormat::A8r8g8b8 => out.copy_from_slice(&argb.to_le_bytes()),
            PixelFormat::R5g6b5 => {
                let r = (argb >> 16) & 0xff;
                let g = (argb >> 8) & 0xff;
                let b = argb & 0xff;
                let packed = (((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3)) as u16;
                out.copy_from_slice(&packed.to_le_bytes());
            }
        }
    }
}

/// Geometry the virtual monitor reports and the framebuffer is sized for
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
    pub refresh_mhz: u32,
    pub format: PixelFormat,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            refresh_mhz: 60_000,
            format: PixelFormat::X8r8g8b8,
        }
    }
}

impl ScreenConfig {
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Framebuffer size in bytes, or None on overflow
    pub fn frame_bytes(&self) -> Option<usize> {
        self.stride().checked_mul(self.height as usize)
    }

    /// Reject geometry a buggy or hostile harness could use to exhaust memory.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DriverError::AllocationFailed(format!(
                "{}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(DriverError::AllocationFailed(format!(
                "{}x{} exceeds the {} pixel limit",
                self.width, self.height, MAX_DIMENSION
            )));
        }
        match self.frame_bytes() {
            Some(bytes) if bytes <= MAX_FRAMEBUFFER_BYTES => {}
            _ => {
                return Err(DriverError::AllocationFailed(format!(
                    "{}x{} {:?} exceeds {} bytes",
                    self.width, self.height, self.format, MAX_FRAMEBUFFER_BYTES
                )))
            }
        }
        if !REFRESH_RANGE_MHZ.contains(&self.refresh_mhz) {
            return Err(DriverError::AllocationFailed(format!(
                "refresh {} mHz outside {:?}",
                self.refresh_mhz, REFRESH_RANGE_MHZ
            )));
        }
        Ok(())
    }
}

/// A mode as reported to the server during probe
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Mode {
    pub width: u32,
    pub height: u32,
    pub refresh_mhz: u32,
    pub preferred: bool,
}

/// What screen init hands back to the server
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub depth: u32,
    pub bits_per_pixel: u32,
    pub refresh_mhz: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VideoState {
    Unprobed,
    Probed,
    ScreenInitialized,
    Active,
    Unloaded,
}

/// Known pixel patterns the harness can paint and later read back
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FillPattern {
    Solid { color: u32 },
    Checkerboard { cell: u32, a: u32, b: u32 },
    /// Each channel ramps 0..=255 left to right
    Gradient,
}

impl FillPattern {
    fn color_at(&self, x: u32, y: u32, width: u32) -> u32 {
        match *self {
            FillPattern::Solid { color } => color,
            FillPattern::Checkerboard { cell, a, b } => {
                let cell = cell.max(1);
                if ((x / cell) + (y / cell)) % 2 == 0 {
                    a
                } else {
                    b
                }
            }
            FillPattern::Gradient => {
                let level = if width > 1 {
                    (x as u64 * 255 / (width as u64 - 1)) as u32
                } else {
                    0
                };
                0xff00_0000 | (level << 16) | (level << 8) | level
            }
        }
    }
}

/// The owned pixel store
#[derive(Debug)]
pub struct FrameBuffer {
    config: ScreenConfig,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a buffer for `config`, filled with [`DEFAULT_FILL`].
    pub fn allocate(config: ScreenConfig) -> Result<Self> {
        config.validate()?;
        let len = config.frame_bytes().ok_or_else(|| {
            DriverError::AllocationFailed(format!("{}x{} overflows", config.width, config.height))
        })?;

        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|e| {
            DriverError::AllocationFailed(format!("cannot reserve {} bytes: {}", len, e))
        })?;
        pixels.resize(len, DEFAULT_FILL);

        Ok(Self { config, pixels })
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.config
    }

    pub fn stride(&self) -> usize {
        self.config.stride()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn fill(&mut self, pattern: &FillPattern) {
        let ScreenConfig {
            width,
            format,
            ..
        } = self.config;
        let bpp = format.bytes_per_pixel();
        let stride = self.stride();
        for (y, row) in self.pixels.chunks_exact_mut(stride).enumerate() {
            for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
                format.pack(pattern.color_at(x as u32, y as u32, width), px);
            }
        }
    }

    /// Copy the contents out for the harness.
    pub fn dump(&self) -> FrameDump {
        FrameDump {
            width: self.config.width,
            height: self.config.height,
            stride: self.stride(),
            format: self.config.format,
            data: self.pixels.clone(),
        }
    }
}

/// A detached copy of the framebuffer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FrameDump {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl FrameDump {
    /// Raw little-endian bytes of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.stride + x as usize * bpp;
        self.data.get(start..start + bpp)
    }

    /// Pixel at (x, y) as 0xAARRGGBB; 16-bit formats are expanded.
    pub fn argb(&self, x: u32, y: u32) -> Option<u32> {
        let px = self.pixel(x, y)?;
        Some(match self.format {
            PixelFormat::X8r8g8b8 => {
                0xff00_0000 | u32::from_le_bytes([px[0], px[1], px[2], 0])
            }
            PixelFormat::A8r8g8b8 => u32::from_le_bytes([px[0], px[1], px[2], px[3]]),
            PixelFormat::R5g6b5 => {
                let v = u16::from_le_bytes([px[0], px[1]]) as u32;
                let r = ((v >> 11) & 0x1f) << 3;
                let g = ((v >> 5) & 0x3f) << 2;
                let b = (v & 0x1f) << 3;
                0xff00_0000 | (r << 16) | (g << 8) | b
            }
        })
    }
}

pub struct VideoDriver {
    state: VideoState,
    config: ScreenConfig,
    framebuffer: Option<FrameBuffer>,
    modes: Vec<Mode>,
    /// Set when screen init failed; the driver stays unusable after that
    failure: Option<String>,
    frames_presented: u64,
    damage: Option<Rect>,
}

impl Default for VideoDriver {
    fn default() -> Self {
        Self::new(ScreenConfig::default())
    }
}

impl VideoDriver {
    pub fn new(config: ScreenConfig) -> Self {
        Self {
            state: VideoState::Unprobed,
            config,
            framebuffer: None,
            modes: Vec::new(),
            failure: None,
            frames_presented: 0,
            damage: None,
        }
    }

    pub fn state(&self) -> VideoState {
        self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn framebuffer(&self) -> Option<&FrameBuffer> {
        self.framebuffer.as_ref()
    }

    /// Damage accumulated since the last presentation
    pub fn pending_damage(&self) -> Option<Rect> {
        self.damage
    }

    fn ensure_usable(&self) -> Result<()> {
        if let Some(reason) = &self.failure {
            return Err(DriverError::UnsupportedOperation(format!(
                "video driver failed to initialize: {}",
                reason
            )));
        }
        if self.state == VideoState::Unloaded {
            return Err(DriverError::UnsupportedOperation(
                "video driver is unloaded".into(),
            ));
        }
        Ok(())
    }

    fn mode_list(&self) -> Vec<Mode> {
        let mut modes = vec![Mode {
            width: self.config.width,
            height: self.config.height,
            refresh_mhz: self.config.refresh_mhz,
            preferred: true,
        }];
        for (width, height) in STANDARD_MODES {
            if modes.iter().any(|m| m.width == width && m.height == height) {
                continue;
            }
            modes.push(Mode {
                width,
                height,
                refresh_mhz: self.config.refresh_mhz,
                preferred: false,
            });
        }
        modes
    }

    // --- host callbacks ---

    /// The server asks which modes the monitor supports.
    pub fn probe(&mut self) -> Result<Vec<Mode>> {
        self.ensure_usable()?;
        match self.state {
            VideoState::Unprobed | VideoState::Probed => {
                self.modes = self.mode_list();
                self.state = VideoState::Probed;
                info!(
                    "Video probed: {} modes, preferred {}x{}",
                    self.modes.len(),
                    self.config.width,
                    self.config.height
                );
                Ok(self.modes.clone())
            }
            state => Err(DriverError::UnsupportedOperation(format!(
                "probe called in state {:?}",
                state
            ))),
        }
    }

    /// Commit to the current config and allocate the framebuffer.
    ///
    /// An allocation failure here is fatal: the driver refuses every later
    /// request rather than running without a screen.
    pub fn screen_init(&mut self) -> Result<ScreenInfo> {
        self.ensure_usable()?;
        if self.state != VideoState::Probed {
            return Err(DriverError::UnsupportedOperation(format!(
                "screen init called in state {:?}",
                self.state
            )));
        }

        match FrameBuffer::allocate(self.config) {
            Ok(fb) => {
                self.framebuffer = Some(fb);
                self.state = VideoState::ScreenInitialized;
                info!(
                    "Screen initialized: {}x{} @ {} mHz {:?}",
                    self.config.width,
                    self.config.height,
                    self.config.refresh_mhz,
                    self.config.format
                );
                Ok(self.screen_info())
            }
            Err(e) => {
                warn!("Screen init failed: {}", e);
                self.failure = Some(e.message().to_string());
                Err(e)
            }
        }
    }

    pub fn screen_info(&self) -> ScreenInfo {
        ScreenInfo {
            width: self.config.width,
            height: self.config.height,
            stride: self.config.stride(),
            depth: self.config.format.depth(),
            bits_per_pixel: self.config.format.bits_per_pixel(),
            refresh_mhz: self.config.refresh_mhz,
        }
    }

    /// The server presents a frame. Contents are left as they are.
    pub fn present(&mut self) -> Result<()> {
        self.ensure_usable()?;
        match self.state {
            VideoState::ScreenInitialized => {
                info!("Video active");
                self.state = VideoState::Active;
            }
            VideoState::Active => {}
            state => {
                return Err(DriverError::UnsupportedOperation(format!(
                    "present called in state {:?}",
                    state
                )))
            }
        }
        self.frames_presented += 1;
        self.damage = None;
        Ok(())
    }

    /// Release the framebuffer. Safe to call repeatedly.
    pub fn close_screen(&mut self) {
        if self.state != VideoState::Unloaded {
            info!(
                "Video unloaded after {} presented frames",
                self.frames_presented
            );
        }
        self.framebuffer = None;
        self.damage = None;
        self.state = VideoState::Unloaded;
    }

    // --- control operations ---

    pub fn screen_config(&self) -> Result<ScreenConfig> {
        self.ensure_usable()?;
        Ok(self.config)
    }

    pub fn set_screen_config(&mut self, new: ScreenConfig) -> Result<()> {
        self.ensure_usable()?;
        if matches!(self.state, VideoState::ScreenInitialized | VideoState::Active) {
            return Err(DriverError::ReconfigureNotSupported(format!(
                "screen already initialized ({:?}); mode switches are not supported mid-session",
                self.state
            )));
        }
        new.validate()?;

        self.config = new;
        if self.state == VideoState::Probed {
            self.modes = self.mode_list();
        }
        debug!(
            "Screen config set to {}x{} @ {} mHz {:?} (state {:?})",
            new.width, new.height, new.refresh_mhz, new.format, self.state
        );
        Ok(())
    }

    pub fn modes(&self) -> Result<Vec<Mode>> {
        self.ensure_usable()?;
        if self.modes.is_empty() {
            Ok(self.mode_list())
        } else {
            Ok(self.modes.clone())
        }
    }

    pub fn dump_frame_buffer(&self) -> Result<FrameDump> {
        self.ensure_usable()?;
        self.framebuffer
            .as_ref()
            .map(FrameBuffer::dump)
            .ok_or_else(|| {
                DriverError::UnsupportedOperation(format!(
                    "no framebuffer in state {:?}",
                    self.state
                ))
            })
    }

    pub fn fill(&mut self, pattern: &FillPattern, host: &mut dyn Host) -> Result<()> {
        self.ensure_usable()?;
        let state = self.state;
        let fb = self.framebuffer.as_mut().ok_or_else(|| {
            DriverError::UnsupportedOperation(format!("no framebuffer in state {:?}", state))
        })?;
        fb.fill(pattern);

        let area = Rect::from_size(fb.config().width, fb.config().height);
        self.damage = Some(area);
        host.damage(area);
        debug!("Framebuffer filled with {:?}", pattern);
        Ok(())
    }
}
