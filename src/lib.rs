//! Host side driver for the CygLidar D1, a small time of flight sensor that
//! streams either a single line of 160 depth samples (2D) or a 160x60 depth
//! image (3D) over a serial line.
//!
//! The crate is layered bottom up:
//!
//! - [`frame`] encodes and decodes the device's checksummed binary frames.
//! - [`transport`] moves bytes, either over a serial port configured by
//!   [`line_config`] or through a file holding a recorded session.
//! - [`cyglidar`] speaks the device's command set and unpacks the 12 bit
//!   samples into point clouds.
//! - [`point_cloud_reader`] and [`frame_writer`] keep the point clouds fresh
//!   and mirror frames to a recording from background threads built on
//!   [`worker`].
//!
//! [`session`] and [`depth_stats`] look at recordings and point clouds after
//! the fact, [`config`] holds the device settings and [`args`] is the command
//! line shared by the `cyglidar` and `monitor` binaries.

#![warn(missing_docs)]
pub mod args;
pub mod config;
pub mod cyglidar;
pub mod depth_stats;
pub mod error;
pub mod frame;
pub mod frame_writer;
pub mod gui;
pub mod line_config;
pub mod point_cloud_reader;
pub mod session;
pub mod transport;
pub mod worker;

pub use cyglidar::{CygLidarD1, Mode};
pub use error::{LidarError, Result};
