//! The error type shared by every layer of the crate, from the byte-level
//! transports up to the background tasks.

use crate::cyglidar::Mode;

use std::{borrow::Cow, error::Error, fmt, io};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LidarError>;

/// Everything that can go wrong while talking to a CygLidar D1 or replaying
/// one of its recordings.
#[derive(Debug)]
pub enum LidarError {
    /// The transport could not be acquired (device busy, file missing, ...).
    Open {
        /// The device or file we tried to open.
        target: String,
        /// What the operating system said about it.
        source: io::Error,
    },

    /// A transport was used before `open()` or after `close()`.
    NotOpen,

    /// A hard transport failure. End of a finite recording lands here too.
    Io(io::Error),

    /// Not enough bytes arrived before the read budget ran out.
    Timeout {
        /// Bytes the frame needed.
        expected: usize,
        /// Bytes that actually arrived.
        received: usize,
    },

    /// The first bytes of a frame were not `5A 77 FF`.
    BadHeader(Vec<u8>),

    /// The two byte length field could not be read.
    BadLength {
        /// Bytes of the length field that arrived.
        received: usize,
    },

    /// The serial driver did not apply the exact custom baud rate requested.
    BaudRateMismatch {
        /// Rate we asked for.
        requested: u32,
        /// Input speed read back from the driver.
        input: u32,
        /// Output speed read back from the driver.
        output: u32,
    },

    /// Explicit checksum validation failed.
    ChecksumInvalid {
        /// Checksum computed over length and payload.
        expected: u8,
        /// Checksum carried by the frame.
        actual: u8,
    },

    /// The requested streaming mode has no decode path.
    UnsupportedMode(Mode),

    /// A configuration value is out of the range the device accepts.
    InvalidConfig(String),

    /// A configuration file could not be read or written.
    Config(String),
}

impl LidarError {
    /// Frame level failures after which the stream is assumed to still be
    /// byte aligned, so the next read may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LidarError::Timeout { .. } | LidarError::BadHeader(_) | LidarError::BadLength { .. }
        )
    }
}

impl fmt::Display for LidarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use LidarError as LE;
        let msg = match self {
            LE::Open { target, source } => Cow::from(format!("unable to open {target}: {source}")),
            LE::NotOpen => Cow::from("transport is not open"),
            LE::Io(error) => Cow::from(format!("io error: {error}")),
            LE::Timeout { expected, received } => Cow::from(format!(
                "timed out after {received} of {expected} bytes"
            )),
            LE::BadHeader(bytes) => Cow::from(format!("bad frame header: {bytes:02X?}")),
            LE::BadLength { received } => {
                Cow::from(format!("bad length field, got {received} of 2 bytes"))
            }
            LE::BaudRateMismatch {
                requested,
                input,
                output,
            } => Cow::from(format!(
                "baud rate {requested} was not applied (driver reports in {input}, out {output})"
            )),
            LE::ChecksumInvalid { expected, actual } => Cow::from(format!(
                "checksum mismatch: expected {expected:#04x}, got {actual:#04x}"
            )),
            LE::UnsupportedMode(mode) => Cow::from(format!("{mode:?} mode is not supported")),
            LE::InvalidConfig(reason) => Cow::from(format!("invalid configuration: {reason}")),
            LE::Config(reason) => Cow::from(format!("configuration file error: {reason}")),
        };

        write!(f, "{}", msg)
    }
}

impl Error for LidarError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LidarError::Open { source, .. } => Some(source),
            LidarError::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for LidarError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ron::Error> for LidarError {
    fn from(value: ron::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<ron::de::SpannedError> for LidarError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::Config(value.to_string())
    }
}
