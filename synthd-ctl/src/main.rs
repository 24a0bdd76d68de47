//! Command-line harness for a running synthd module
//!
//! Useful for poking at a test display by hand and from shell-based test
//! scripts. Every subcommand is one control request.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};

use synthd_core::input::{Axis, Capabilities, DeviceId, DeviceKind, InputEvent, KeyId, ScrollAxis};
use synthd_core::video::{FillPattern, FrameDump, PixelFormat, ScreenConfig};
use synthd_core::{ControlClient, ControlConfig};

#[derive(Parser)]
#[command(name = "synthd-ctl")]
#[command(about = "Drive the synthd test display over its control socket")]
#[command(version)]
struct Cli {
    /// Control socket (defaults to $SYNTHD_CONTROL_SOCKET, then
    /// $XDG_RUNTIME_DIR/synthd.sock)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show driver phase, video state and device count
    Status,
    /// Show or change the screen configuration
    Screen {
        #[command(subcommand)]
        action: ScreenAction,
    },
    /// List the modes the virtual monitor reports
    Modes,
    /// Save the framebuffer as an image
    Dump {
        #[arg(short, long)]
        output: PathBuf,
        /// Also write width, height, stride and format as JSON here
        #[arg(long)]
        meta: Option<PathBuf>,
    },
    /// Paint the framebuffer
    Fill {
        #[command(subcommand)]
        pattern: PatternArg,
    },
    /// Register a synthetic device
    AddDevice {
        #[arg(value_enum)]
        kind: KindArg,
        /// Key names or keycodes (keyboards)
        #[arg(long, value_delimiter = ',')]
        keys: Vec<String>,
        /// Button numbers (pointers)
        #[arg(long, value_delimiter = ',')]
        buttons: Vec<u32>,
        /// Give a pointer every axis
        #[arg(long)]
        all_axes: bool,
    },
    /// Press and/or release a key
    Key {
        device: u32,
        key: String,
        #[arg(long, value_enum, default_value_t = Press::Tap)]
        action: Press,
    },
    /// Press and/or release a pointer button
    Button {
        device: u32,
        button: u32,
        #[arg(long, value_enum, default_value_t = Press::Tap)]
        action: Press,
    },
    /// Move the pointer, relatively or to an absolute position
    Motion {
        device: u32,
        #[arg(allow_hyphen_values = true)]
        x: i32,
        #[arg(allow_hyphen_values = true)]
        y: i32,
        #[arg(long)]
        absolute: bool,
    },
    /// Scroll by `delta` units
    Scroll {
        device: u32,
        #[arg(allow_hyphen_values = true)]
        delta: f64,
        #[arg(long)]
        horizontal: bool,
    },
    /// List registered devices
    Devices,
}

#[derive(Subcommand)]
enum ScreenAction {
    Get,
    Set {
        width: u32,
        height: u32,
        #[arg(long, default_value_t = 60_000)]
        refresh_mhz: u32,
        #[arg(long, value_enum, default_value_t = FormatArg::X8r8g8b8)]
        format: FormatArg,
    },
}

#[derive(Subcommand)]
enum PatternArg {
    Solid {
        /// 0xRRGGBB or 0xAARRGGBB
        color: String,
    },
    Checkerboard {
        #[arg(long, default_value_t = 16)]
        cell: u32,
        #[arg(default_value = "0x000000")]
        a: String,
        #[arg(default_value = "0xffffff")]
        b: String,
    },
    Gradient,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Keyboard,
    Pointer,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Press {
    Down,
    Up,
    Tap,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    X8r8g8b8,
    A8r8g8b8,
    R5g6b5,
}

impl From<FormatArg> for PixelFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::X8r8g8b8 => PixelFormat::X8r8g8b8,
            FormatArg::A8r8g8b8 => PixelFormat::A8r8g8b8,
            FormatArg::R5g6b5 => PixelFormat::R5g6b5,
        }
    }
}

#[derive(Serialize)]
struct DumpMeta {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

fn parse_color(s: &str) -> Result<u32> {
    let hex = s.trim_start_matches("0x").trim_start_matches('#');
    u32::from_str_radix(hex, 16).with_context(|| format!("invalid color {:?}", s))
}

fn parse_key(s: &str) -> KeyId {
    match s.parse::<u32>() {
        Ok(code) => KeyId::Keycode(code),
        Err(_) => KeyId::Named(s.to_string()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Convert a dump to RGBA, whatever the framebuffer format
fn to_rgba(dump: &FrameDump) -> Result<image::RgbaImage> {
    let mut rgba = Vec::with_capacity(dump.width as usize * dump.height as usize * 4);
    for y in 0..dump.height {
        for x in 0..dump.width {
            let argb = dump
                .argb(x, y)
                .with_context(|| format!("dump is short at ({}, {})", x, y))?;
            let [b, g, r, a] = argb.to_le_bytes();
            rgba.extend_from_slice(&[r, g, b, a]);
        }
    }
    image::RgbaImage::from_raw(dump.width, dump.height, rgba)
        .context("Failed to create image buffer")
}

fn inject_press(
    client: &mut ControlClient,
    device: DeviceId,
    action: Press,
    event: impl Fn(bool) -> InputEvent,
) -> Result<()> {
    if action != Press::Up {
        let accepted = client.inject(device, event(true))?;
        debug!("Accepted press as serial {}", accepted.serial);
    }
    if action != Press::Down {
        let accepted = client.inject(device, event(false))?;
        debug!("Accepted release as serial {}", accepted.serial);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = ControlConfig::from_env();
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_request_timeout(Duration::from_millis(ms));
    }

    let mut client = ControlClient::connect(&config)
        .with_context(|| format!("connecting to {}", config.socket_path.display()))?;
    info!("Connected to {}", client.driver());

    match cli.command {
        Command::Status => print_json(&client.status()?)?,
        Command::Screen { action } => match action {
            ScreenAction::Get => print_json(&client.screen_config()?)?,
            ScreenAction::Set {
                width,
                height,
                refresh_mhz,
                format,
            } => {
                let applied = client.set_screen_config(ScreenConfig {
                    width,
                    height,
                    refresh_mhz,
                    format: format.into(),
                })?;
                print_json(&applied)?;
            }
        },
        Command::Modes => {
            for mode in client.modes()? {
                println!(
                    "{}x{} @ {}.{:03} Hz{}",
                    mode.width,
                    mode.height,
                    mode.refresh_mhz / 1000,
                    mode.refresh_mhz % 1000,
                    if mode.preferred { " (preferred)" } else { "" }
                );
            }
        }
        Command::Dump { output, meta } => {
            let dump = client.dump_frame_buffer()?;
            to_rgba(&dump)?
                .save(&output)
                .with_context(|| format!("saving {}", output.display()))?;
            info!("Framebuffer saved to {}", output.display());
            if let Some(meta) = meta {
                let json = serde_json::to_string_pretty(&DumpMeta {
                    width: dump.width,
                    height: dump.height,
                    stride: dump.stride,
                    format: dump.format,
                })?;
                std::fs::write(&meta, json)
                    .with_context(|| format!("writing {}", meta.display()))?;
            }
        }
        Command::Fill { pattern } => {
            let pattern = match pattern {
                PatternArg::Solid { color } => FillPattern::Solid {
                    color: parse_color(&color)?,
                },
                PatternArg::Checkerboard { cell, a, b } => FillPattern::Checkerboard {
                    cell,
                    a: parse_color(&a)?,
                    b: parse_color(&b)?,
                },
                PatternArg::Gradient => FillPattern::Gradient,
            };
            client.fill(pattern)?;
        }
        Command::AddDevice {
            kind,
            keys,
            buttons,
            all_axes,
        } => {
            let kind = match kind {
                KindArg::Keyboard => DeviceKind::Keyboard,
                KindArg::Pointer => DeviceKind::Pointer,
            };
            if kind == DeviceKind::Keyboard && keys.is_empty() {
                bail!("a keyboard needs at least one --keys entry");
            }
            let axes = if all_axes {
                vec![
                    Axis::RelX,
                    Axis::RelY,
                    Axis::AbsX,
                    Axis::AbsY,
                    Axis::ScrollVertical,
                    Axis::ScrollHorizontal,
                ]
            } else {
                Vec::new()
            };
            let capabilities = Capabilities {
                keys: keys.iter().map(|k| parse_key(k)).collect(),
                buttons,
                axes,
            };
            let id = client.register_device(kind, capabilities)?;
            println!("{}", id);
        }
        Command::Key {
            device,
            key,
            action,
        } => {
            let key = parse_key(&key);
            inject_press(&mut client, DeviceId(device), action, |pressed| {
                InputEvent::key(key.clone(), pressed)
            })?;
        }
        Command::Button {
            device,
            button,
            action,
        } => {
            inject_press(&mut client, DeviceId(device), action, |pressed| {
                InputEvent::button(button, pressed)
            })?;
        }
        Command::Motion {
            device,
            x,
            y,
            absolute,
        } => {
            let event = if absolute {
                InputEvent::MotionAbsolute { x, y }
            } else {
                InputEvent::Motion { dx: x, dy: y }
            };
            client.inject(DeviceId(device), event)?;
        }
        Command::Scroll {
            device,
            delta,
            horizontal,
        } => {
            let axis = if horizontal {
                ScrollAxis::Horizontal
            } else {
                ScrollAxis::Vertical
            };
            client.inject(DeviceId(device), InputEvent::Scroll { axis, delta })?;
        }
        Command::Devices => print_json(&client.devices()?)?,
    }

    client.close();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_accepts_prefixes() {
        assert_eq!(parse_color("0xff8000").unwrap(), 0xff8000);
        assert_eq!(parse_color("#00ff00").unwrap(), 0x00ff00);
        assert!(parse_color("orange").is_err());
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("38"), KeyId::Keycode(38));
        assert_eq!(parse_key("a"), KeyId::Named("a".into()));
    }

    #[test]
    fn test_cli_parses_key_tap() {
        let cli = Cli::try_parse_from(["synthd-ctl", "key", "1", "a"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Key {
                device: 1,
                action: Press::Tap,
                ..
            }
        ));
    }
}
