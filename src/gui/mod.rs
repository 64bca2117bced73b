//! Terminal widgets shared by the binaries.

mod device_selector;
mod error;

pub use device_selector::device_selector;
pub use error::LidarGuiError;
