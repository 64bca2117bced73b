// Commandline argument parser using clap for the CygLidar tools

use crate::config::{BaudRate, Config, PulseDuration, PulseMode};
use crate::cyglidar::{CygLidarD1, Mode};
use crate::error::{LidarError, Result};
use crate::transport::{FileStream, IoStream, SerialPortStream};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::warn;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Talk to, replay or inspect a CygLidar D1
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct LidarArgs {
    #[command(subcommand, long_about)]
    /// Where the frames come from, or what to do instead of streaming
    pub command: SourceCommand,

    /// Which frames to stream and decode
    #[arg(short, long, value_enum, default_value_t = ModeArg::ThreeD, global = true)]
    pub mode: ModeArg,

    /// Mirror every decoded frame into this file
    #[arg(short = 'o', long = "out", global = true)]
    pub outfile: Option<PathBuf>,
}

#[allow(missing_docs)]
#[derive(Debug, Subcommand, Clone)]
pub enum SourceCommand {
    /// Talk to a CygLidar D1 on a serial port
    #[command(about)]
    Device(DeviceCommand),

    /// Play a recorded session back
    #[command(about)]
    Replay(ReplayCommand),

    /// Count the frames in a recorded session
    #[command(about)]
    Inspect(InspectCommand),

    /// List the serial ports of this machine
    #[command(about)]
    Ports,
}

#[allow(missing_docs)]
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct DeviceCommand {
    /// Serial device the lidar is attached to, picked from the available
    /// ports when left out
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Speed of the host side of the serial line
    #[arg(long, default_value_t = 250_000)]
    pub serial_baud: u32,

    /// Speed the lidar is told to use
    #[arg(long, value_enum, default_value_t = BaudArg::B250000)]
    pub lidar_baud: BaudArg,

    /// Frequency channel, 0 to 15
    #[arg(long, default_value_t = 10)]
    pub channel: u8,

    /// Pulse duration, at most 14 bits
    #[arg(long, default_value_t = 7000)]
    pub pulse: u16,

    /// How the lidar picks its pulse duration
    #[arg(long, value_enum, default_value_t = PulseModeArg::Auto3d)]
    pub pulse_mode: PulseModeArg,

    /// Sensitivity, 0 to 255
    #[arg(long, default_value_t = 10)]
    pub sensitivity: u8,

    /// Read the device settings from this ron file instead
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[allow(missing_docs)]
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct ReplayCommand {
    /// Recorded session to play back
    #[arg(short, long)]
    pub file: PathBuf,

    /// Milliseconds to wait on every read, 0 replays as fast as possible
    #[arg(long, default_value_t = 20)]
    pub pace_ms: u64,
}

#[allow(missing_docs)]
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct InspectCommand {
    /// Recorded session to look at
    #[arg(short, long)]
    pub file: PathBuf,
}

/// Streaming mode as spelled on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// One line of 160 samples
    #[value(name = "2d")]
    TwoD,
    /// A 160x60 depth image
    #[value(name = "3d")]
    ThreeD,
    /// Both at once (not decoded)
    Dual,
}

impl From<ModeArg> for Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::TwoD => Mode::Mode2D,
            ModeArg::ThreeD => Mode::Mode3D,
            ModeArg::Dual => Mode::Dual,
        }
    }
}

/// Line speeds the lidar can be switched to
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BaudArg {
    #[value(name = "57600")]
    B57600,
    #[value(name = "115200")]
    B115200,
    #[value(name = "250000")]
    B250000,
    #[value(name = "3000000")]
    B3000000,
}

impl From<BaudArg> for BaudRate {
    fn from(value: BaudArg) -> Self {
        match value {
            BaudArg::B57600 => BaudRate::B57k6,
            BaudArg::B115200 => BaudRate::B115k2,
            BaudArg::B250000 => BaudRate::B250k,
            BaudArg::B3000000 => BaudRate::B3M,
        }
    }
}

/// Pulse mode as spelled on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PulseModeArg {
    /// Device adapts the pulse, 3D only
    Auto3d,
    /// Fixed pulse, 3D only
    Fixed3d,
    /// Device adapts the pulse, dual mode
    AutoDual,
    /// Fixed pulse, dual mode
    FixedDual,
}

impl From<PulseModeArg> for PulseMode {
    fn from(value: PulseModeArg) -> Self {
        match value {
            PulseModeArg::Auto3d => PulseMode::Auto3D,
            PulseModeArg::Fixed3d => PulseMode::Fixed3D,
            PulseModeArg::AutoDual => PulseMode::AutoDual,
            PulseModeArg::FixedDual => PulseMode::FixedDual,
        }
    }
}

impl LidarArgs {
    /// The streaming mode as the library spells it.
    pub fn mode(&self) -> Mode {
        self.mode.into()
    }

    /// Open the recording target, if one was asked for.
    pub fn open_output(&self) -> Result<Option<Arc<IoStream>>> {
        self.outfile
            .as_ref()
            .map(|path| IoStream::create_and_open(FileStream::record(path)).map(Arc::new))
            .transpose()
    }
}

impl DeviceCommand {
    /// The settings to send, from `--config` or from the individual flags.
    pub fn config(&self) -> Result<Config> {
        if let Some(path) = &self.config {
            return Config::from_path(path);
        }
        let config = Config {
            baud_rate: self.lidar_baud.into(),
            frequency_channel: self.channel,
            pulse_duration: PulseDuration::new(self.pulse_mode.into(), self.pulse),
            sensitivity: self.sensitivity,
        };
        config.validate()?;
        Ok(config)
    }

    /// `--path`, or the only serial port there is.
    pub fn port(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let mut ports = SerialPortStream::available_ports()?;
        if ports.len() == 1 {
            return Ok(ports.remove(0));
        }
        Err(LidarError::Open {
            target: "serial port".to_string(),
            source: io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} candidates, choose one with --path", ports.len()),
            ),
        })
    }

    /// Open the port at `path`, report the device and send the settings.
    /// Streaming is left to the caller.
    pub fn connect(&self, path: &Path) -> Result<Arc<CygLidarD1>> {
        let config = self.config()?;
        if config.baud_rate.bits_per_second() != self.serial_baud {
            warn!(
                "lidar is told to use {} but the host line runs at {} baud",
                config.baud_rate, self.serial_baud
            );
        }

        let io = IoStream::create_and_open(SerialPortStream::new(path, self.serial_baud))?;
        let lidar = CygLidarD1::new(Arc::new(io));
        lidar.print_device_info()?;
        lidar.configure(&config)?;
        Ok(Arc::new(lidar))
    }
}

impl ReplayCommand {
    /// Open the recording as if it were the device.
    pub fn connect(&self) -> Result<Arc<CygLidarD1>> {
        let stream = FileStream::replay(&self.file).with_pace(Duration::from_millis(self.pace_ms));
        let io = IoStream::create_and_open(stream)?;
        Ok(Arc::new(CygLidarD1::new(Arc::new(io))))
    }
}
