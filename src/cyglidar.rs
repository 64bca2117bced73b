//! The CygLidar D1 command set and the decoding of its sample frames.
//!
//! [`CygLidarD1`] issues commands synchronously on the caller's thread and
//! keeps the most recent 2D and 3D frames, together with the point clouds
//! decoded from them, behind a single lock. Background tasks drive it through
//! [`PointCloudProvider`] and [`FrameProvider`]; consumers only ever look at
//! the buffers through the `use_*` accessors.

use crate::config::Config;
use crate::error::{LidarError, Result};
use crate::frame::Frame;
use crate::frame_writer::FrameProvider;
use crate::point_cloud_reader::PointCloudProvider;
use crate::transport::IoStream;

use log::{debug, info};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Columns of the 3D depth image.
pub const WIDTH_3D: usize = 160;
/// Rows of the 3D depth image.
pub const HEIGHT_3D: usize = 60;
/// Samples in a 3D point cloud.
pub const POINTS_3D: usize = WIDTH_3D * HEIGHT_3D;
/// Samples in a 2D point cloud.
pub const POINTS_2D: usize = 160;

/// Payload of a 3D frame: a leading status byte, then two samples packed in
/// every three bytes.
pub const FRAME_SIZE_3D: usize = POINTS_3D * 3 / 2 + 1;
/// Payload of a 2D frame: a leading status byte, then one sample in every two
/// bytes.
pub const FRAME_SIZE_2D: usize = 322 + 1;

#[allow(missing_docs)]
pub type Frame3D = Frame<FRAME_SIZE_3D>;
#[allow(missing_docs)]
pub type Frame2D = Frame<FRAME_SIZE_2D>;

/// Row major 12 bit depth samples.
pub type PointCloud3D = [u16; POINTS_3D];
/// 12 bit depth samples, one per angle.
pub type PointCloud2D = [u16; POINTS_2D];

/// Streaming modes. The value is the opcode of the run command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// One line of 160 samples
    Mode2D,
    /// A 160x60 depth image
    Mode3D,
    /// Both at once; the device accepts it but nothing here decodes it
    Dual,
}

impl Mode {
    /// Opcode of the run command for this mode.
    pub fn code(self) -> u8 {
        match self {
            Mode::Mode2D => 0x01,
            Mode::Mode3D => 0x08,
            Mode::Dual => 0x07,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Mode2D => "2D",
            Mode::Mode3D => "3D",
            Mode::Dual => "dual",
        })
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum Command {
    DeviceInfo = 0x10,
    Stop = 0x02,
    SetPulseDuration = 0x0C,
    SetFrequencyChannel = 0x0F,
    SetSensitivity = 0x11,
    SetBaudRate = 0x12,
}

/// The answer to a device info request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    payload: [u8; 7],
}

impl DeviceInfo {
    /// Wrap the 7 byte response payload.
    pub fn from_payload(payload: [u8; 7]) -> Self {
        Self { payload }
    }

    /// Echo of the request opcode.
    pub fn response_code(&self) -> u8 {
        self.payload[0]
    }

    /// Firmware version, major first.
    pub fn firmware(&self) -> [u8; 3] {
        [self.payload[2], self.payload[3], self.payload[4]]
    }

    /// Hardware revision, major first.
    pub fn hardware(&self) -> [u8; 2] {
        [self.payload[5], self.payload[6]]
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.payload.iter();
        if let Some(first) = bytes.next() {
            write!(f, "{}", first)?;
        }
        for byte in bytes {
            write!(f, ".{}", byte)?;
        }
        Ok(())
    }
}

/// Unpack a 3D payload into `cloud`. The leading byte is skipped, then every
/// three bytes `a b c` hold two samples:
/// `a | (b & 0x0F) << 8` and `(b & 0xF0) >> 4 | c << 4`.
pub fn decode_3d(payload: &[u8], cloud: &mut [u16]) {
    let packed = payload.get(1..).unwrap_or_default();
    for (samples, bytes) in cloud.chunks_mut(2).zip(packed.chunks_exact(3)) {
        let (a, b, c) = (bytes[0] as u16, bytes[1] as u16, bytes[2] as u16);
        samples[0] = a | ((b & 0x0F) << 8);
        if let Some(second) = samples.get_mut(1) {
            *second = ((b & 0xF0) >> 4) | (c << 4);
        }
    }
}

/// Unpack a 2D payload into `cloud`. The leading byte is skipped, then every
/// two bytes `a b` hold the sample `a | (b & 0x0F) << 8`.
pub fn decode_2d(payload: &[u8], cloud: &mut [u16]) {
    let packed = payload.get(1..).unwrap_or_default();
    for (sample, bytes) in cloud.iter_mut().zip(packed.chunks_exact(2)) {
        *sample = bytes[0] as u16 | ((bytes[1] as u16 & 0x0F) << 8);
    }
}

struct Buffers {
    frame_3d: Box<Frame3D>,
    frame_2d: Box<Frame2D>,
    cloud_3d: Box<PointCloud3D>,
    cloud_2d: Box<PointCloud2D>,
    decoded_3d: u64,
    decoded_2d: u64,
}

impl Default for Buffers {
    fn default() -> Self {
        Self {
            frame_3d: Box::default(),
            frame_2d: Box::default(),
            cloud_3d: Box::new([0; POINTS_3D]),
            cloud_2d: Box::new([0; POINTS_2D]),
            decoded_3d: 0,
            decoded_2d: 0,
        }
    }
}

/// A CygLidar D1 reachable through `io`.
///
/// Dropping the controller sends the stop command.
pub struct CygLidarD1 {
    io: Arc<IoStream>,
    buffers: Mutex<Buffers>,
    read_failed: AtomicBool,
    frames_decoded: AtomicU64,
}

impl CygLidarD1 {
    /// Drive the device behind `io`, which must already be open.
    pub fn new(io: Arc<IoStream>) -> Self {
        Self {
            io,
            buffers: Mutex::new(Buffers::default()),
            read_failed: AtomicBool::new(false),
            frames_decoded: AtomicU64::new(0),
        }
    }

    fn buffers(&self) -> MutexGuard<'_, Buffers> {
        self.buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send<const N: usize>(&self, payload: [u8; N]) -> Result<()> {
        debug!("sending command {:#04x}", payload[0]);
        Frame::new(payload).write(&self.io)
    }

    /// Ask the device for its firmware and hardware revisions.
    pub fn device_info(&self) -> Result<DeviceInfo> {
        self.send([Command::DeviceInfo as u8, 0x00])?;
        let response = Frame::<7>::read(&self.io)?;
        Ok(DeviceInfo::from_payload(*response.payload()))
    }

    /// Query the device info and log it.
    pub fn print_device_info(&self) -> Result<()> {
        let device_info = self.device_info()?;
        info!(
            "CygLidar D1 device info {} (firmware {:?}, hardware {:?})",
            device_info,
            device_info.firmware(),
            device_info.hardware()
        );
        Ok(())
    }

    /// Send baud rate, pulse duration, frequency channel and sensitivity, in
    /// that order. The first failing write ends the sequence.
    pub fn configure(&self, config: &Config) -> Result<()> {
        config.validate()?;

        self.send([Command::SetBaudRate as u8, config.baud_rate.code()])?;
        let [low, high] = config.pulse_duration.word().to_le_bytes();
        self.send([Command::SetPulseDuration as u8, low, high])?;
        self.send([Command::SetFrequencyChannel as u8, config.frequency_channel])?;
        self.send([Command::SetSensitivity as u8, config.sensitivity])?;

        info!(
            "Configured: {}, channel {}, pulse {:#06x}, sensitivity {}",
            config.baud_rate,
            config.frequency_channel,
            config.pulse_duration.word(),
            config.sensitivity
        );
        Ok(())
    }

    /// Start streaming in `mode`.
    pub fn run(&self, mode: Mode) -> Result<()> {
        info!("Starting {} streaming", mode);
        self.send([mode.code(), 0x00])
    }

    /// Stop streaming.
    ///
    /// A serial transport holds its port for the length of a read, so stop
    /// the [`PointCloudReader`](crate::point_cloud_reader::PointCloudReader)
    /// first or this write can queue behind back to back frame reads.
    pub fn stop(&self) -> Result<()> {
        self.send([Command::Stop as u8, 0x00])
    }

    /// Read one 3D frame and decode it into the 3D point cloud.
    pub fn read_and_parse_3d_frame(&self) -> Result<()> {
        self.read_and_store(|buffers, frame: Frame3D| {
            decode_3d(frame.payload(), &mut buffers.cloud_3d[..]);
            *buffers.frame_3d = frame;
            buffers.decoded_3d += 1;
        })
    }

    /// Read one 2D frame and decode it into the 2D point cloud.
    pub fn read_and_parse_2d_frame(&self) -> Result<()> {
        self.read_and_store(|buffers, frame: Frame2D| {
            decode_2d(frame.payload(), &mut buffers.cloud_2d[..]);
            *buffers.frame_2d = frame;
            buffers.decoded_2d += 1;
        })
    }

    /// Read and decode one frame of `mode`.
    pub fn read_and_parse(&self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Mode3D => self.read_and_parse_3d_frame(),
            Mode::Mode2D => self.read_and_parse_2d_frame(),
            Mode::Dual => Err(LidarError::UnsupportedMode(mode)),
        }
    }

    /// Frame level failures leave every buffer as it was and only raise the
    /// `read_failed` flag. Transport failures raise it too, then propagate.
    fn read_and_store<const N: usize>(&self, store: impl FnOnce(&mut Buffers, Frame<N>)) -> Result<()> {
        match Frame::<N>::read(&self.io) {
            Ok(frame) => {
                store(&mut self.buffers(), frame);
                self.read_failed.store(false, Ordering::Release);
                self.frames_decoded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                debug!("dropping frame: {}", e);
                self.read_failed.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.read_failed.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Whether the most recent decode attempt failed.
    pub fn read_failed(&self) -> bool {
        self.read_failed.load(Ordering::Acquire)
    }

    /// Frames decoded since construction, both modes together.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    /// Run `accessor` on the 3D point cloud. The lock is held while it runs,
    /// so it must not call back into the controller.
    pub fn use_3d_point_cloud<R>(&self, accessor: impl FnOnce(&PointCloud3D) -> R) -> R {
        accessor(&self.buffers().cloud_3d)
    }

    /// Run `accessor` on the 2D point cloud; same locking rules as
    /// [`CygLidarD1::use_3d_point_cloud`].
    pub fn use_2d_point_cloud<R>(&self, accessor: impl FnOnce(&PointCloud2D) -> R) -> R {
        accessor(&self.buffers().cloud_2d)
    }

    /// Run `accessor` on the last 3D frame received.
    pub fn use_3d_frame<R>(&self, accessor: impl FnOnce(&Frame3D) -> R) -> R {
        accessor(&self.buffers().frame_3d)
    }

    /// Run `accessor` on the last 2D frame received.
    pub fn use_2d_frame<R>(&self, accessor: impl FnOnce(&Frame2D) -> R) -> R {
        accessor(&self.buffers().frame_2d)
    }

    /// Wire bytes of the last frame decoded in `mode`, or `None` before the
    /// first one.
    pub fn latest_raw_frame(&self, mode: Mode) -> Option<Vec<u8>> {
        let buffers = self.buffers();
        match mode {
            Mode::Mode3D if buffers.decoded_3d > 0 => Some(buffers.frame_3d.raw()),
            Mode::Mode2D if buffers.decoded_2d > 0 => Some(buffers.frame_2d.raw()),
            _ => None,
        }
    }
}

impl PointCloudProvider for CygLidarD1 {
    fn read_and_parse(&self, mode: Mode) -> Result<()> {
        CygLidarD1::read_and_parse(self, mode)
    }
}

impl FrameProvider for CygLidarD1 {
    fn latest_raw_frame(&self, mode: Mode) -> Option<Vec<u8>> {
        CygLidarD1::latest_raw_frame(self, mode)
    }
}

impl Drop for CygLidarD1 {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            debug!("ignoring error while stopping the device: {}", e);
        }
    }
}
