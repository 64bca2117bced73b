//! Device settings sent by [`CygLidarD1::configure`](crate::cyglidar::CygLidarD1::configure).
//!
//! A [`Config`] can be kept on disk as [ron]:
//!
//! ```text
//! (
//!     baud_rate: B250k,
//!     frequency_channel: 10,
//!     pulse_duration: (mode: Auto3D, duration: 7000),
//!     sensitivity: 10,
//! )
//! ```

use crate::error::{LidarError, Result};

use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path};

/// Highest frequency channel the device accepts.
pub const MAX_FREQUENCY_CHANNEL: u8 = 15;

/// Largest pulse duration that fits below the mode tag.
pub const MAX_PULSE_DURATION: u16 = (1 << 14) - 1;

/// Serial speeds the device can be switched to, with the code the
/// set-baud-rate command carries for each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum BaudRate {
    /// 57600 baud
    B57k6,
    /// 115200 baud
    B115k2,
    /// 250000 baud, the factory setting
    #[default]
    B250k,
    /// 3000000 baud
    B3M,
}

impl BaudRate {
    /// The byte the set-baud-rate command carries.
    pub fn code(self) -> u8 {
        match self {
            BaudRate::B57k6 => 0x39,
            BaudRate::B115k2 => 0xAA,
            BaudRate::B250k => 0x77,
            BaudRate::B3M => 0x55,
        }
    }

    /// The line speed the host has to use once the device switched.
    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B57k6 => 57_600,
            BaudRate::B115k2 => 115_200,
            BaudRate::B250k => 250_000,
            BaudRate::B3M => 3_000_000,
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} baud", self.bits_per_second())
    }
}

/// How the device picks its light pulse duration. Sent in the top two bits of
/// the pulse duration word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum PulseMode {
    /// Device adapts the pulse, 3D only
    #[default]
    Auto3D,
    /// Fixed pulse, 3D only
    Fixed3D,
    /// Device adapts the pulse, dual mode
    AutoDual,
    /// Fixed pulse, dual mode
    FixedDual,
}

impl PulseMode {
    fn tag(self) -> u16 {
        let bits: u16 = match self {
            PulseMode::Auto3D => 0,
            PulseMode::Fixed3D => 1,
            PulseMode::AutoDual => 2,
            PulseMode::FixedDual => 3,
        };
        bits << 14
    }
}

/// A pulse duration magnitude together with its [`PulseMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PulseDuration {
    /// Mode tag
    pub mode: PulseMode,
    /// Magnitude, at most [`MAX_PULSE_DURATION`]
    pub duration: u16,
}

impl PulseDuration {
    #[allow(missing_docs)]
    pub fn new(mode: PulseMode, duration: u16) -> Self {
        Self { mode, duration }
    }

    /// The 16 bit word as the device expects it: mode tag in bits 14 and 15,
    /// magnitude below.
    pub fn word(&self) -> u16 {
        self.mode.tag() | (self.duration & MAX_PULSE_DURATION)
    }
}

impl Default for PulseDuration {
    fn default() -> Self {
        Self::new(PulseMode::Auto3D, 7000)
    }
}

/// Everything `configure` sends to the device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Line speed the device should switch to
    pub baud_rate: BaudRate,
    /// 0 to 15
    pub frequency_channel: u8,
    #[allow(missing_docs)]
    pub pulse_duration: PulseDuration,
    #[allow(missing_docs)]
    pub sensitivity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::B250k,
            frequency_channel: 10,
            pulse_duration: PulseDuration::default(),
            sensitivity: 10,
        }
    }
}

impl Config {
    /// Reject values the device cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.frequency_channel > MAX_FREQUENCY_CHANNEL {
            return Err(LidarError::InvalidConfig(format!(
                "frequency channel {} is above {}",
                self.frequency_channel, MAX_FREQUENCY_CHANNEL
            )));
        }
        if self.pulse_duration.duration > MAX_PULSE_DURATION {
            return Err(LidarError::InvalidConfig(format!(
                "pulse duration {} does not fit in 14 bits",
                self.pulse_duration.duration
            )));
        }
        Ok(())
    }

    /// Load and validate a configuration written with [`Config::to_path`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Config = ron::de::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty printed ron.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn baud_codes_match_the_device_table() {
        assert_eq!(BaudRate::B57k6.code(), 0x39);
        assert_eq!(BaudRate::B115k2.code(), 0xAA);
        assert_eq!(BaudRate::B250k.code(), 0x77);
        assert_eq!(BaudRate::B3M.code(), 0x55);
        assert_eq!(BaudRate::B3M.bits_per_second(), 3_000_000);
    }

    #[test]
    fn pulse_mode_lands_in_the_top_bits() {
        assert_eq!(PulseDuration::new(PulseMode::Auto3D, 7000).word(), 7000);
        assert_eq!(PulseDuration::new(PulseMode::Fixed3D, 7000).word(), 0x4000 | 7000);
        assert_eq!(PulseDuration::new(PulseMode::AutoDual, 1).word(), 0x8001);
        assert_eq!(PulseDuration::new(PulseMode::FixedDual, 0x3FFF).word(), 0xFFFF);
    }

    #[test]
    fn default_is_the_usual_bring_up() {
        let config = Config::default();
        assert_eq!(config.baud_rate, BaudRate::B250k);
        assert_eq!(config.frequency_channel, 10);
        assert_eq!(config.pulse_duration.word(), 7000);
        assert_eq!(config.sensitivity, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = Config {
            frequency_channel: 16,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(LidarError::InvalidConfig(_))));

        let config = Config {
            pulse_duration: PulseDuration::new(PulseMode::Auto3D, 0x4000),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(LidarError::InvalidConfig(_))));
    }

    #[test]
    fn write_and_read_path() {
        let tempfile = NamedTempFile::new().unwrap();
        let config = Config {
            baud_rate: BaudRate::B3M,
            frequency_channel: 3,
            pulse_duration: PulseDuration::new(PulseMode::Fixed3D, 2500),
            sensitivity: 200,
        };

        config.to_path(tempfile.path()).unwrap();
        assert_eq!(Config::from_path(tempfile.path()).unwrap(), config);
    }

    #[test]
    fn hand_written_file_is_understood() {
        let tempfile = NamedTempFile::new().unwrap();
        fs::write(
            tempfile.path(),
            "(baud_rate: B115k2, frequency_channel: 0, \
             pulse_duration: (mode: AutoDual, duration: 100), sensitivity: 1)",
        )
        .unwrap();

        let config = Config::from_path(tempfile.path()).unwrap();
        assert_eq!(config.baud_rate, BaudRate::B115k2);
        assert_eq!(config.pulse_duration.word(), 0x8000 | 100);
    }

    #[test]
    fn garbage_file_is_a_config_error() {
        let tempfile = NamedTempFile::new().unwrap();
        fs::write(tempfile.path(), "(baud_rate: 12").unwrap();
        assert!(matches!(
            Config::from_path(tempfile.path()),
            Err(LidarError::Config(_))
        ));
    }
}
