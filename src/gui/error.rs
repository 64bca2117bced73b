use crate::error::LidarError;

use std::{error::Error, fmt::Display, io};

/// What can go wrong while a terminal interface is up.
#[derive(Debug)]
pub enum LidarGuiError {
    /// Drawing or reading terminal events failed
    IOError(io::Error),
    /// The lidar side failed
    LidarError(LidarError),
}

impl Display for LidarGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LidarGuiError::IOError(e) => write!(f, "terminal error: {}", e),
            LidarGuiError::LidarError(e) => write!(f, "{}", e),
        }
    }
}

impl Error for LidarGuiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LidarGuiError::IOError(e) => Some(e),
            LidarGuiError::LidarError(e) => Some(e),
        }
    }
}

impl From<io::Error> for LidarGuiError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<LidarError> for LidarGuiError {
    fn from(value: LidarError) -> Self {
        Self::LidarError(value)
    }
}
