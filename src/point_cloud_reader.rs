//! Keeps a provider's point cloud fresh from a background thread.

use crate::cyglidar::Mode;
use crate::error::Result;
use crate::worker::{Worker, WorkerStatus};

use std::sync::Arc;
use std::time::Duration;

/// Pause between two decode attempts.
pub const READ_PERIOD: Duration = Duration::from_millis(2);

/// Something that can pull one frame off its transport and decode it.
pub trait PointCloudProvider: Send + Sync + 'static {
    /// Read and decode one frame of `mode`. Frame level failures are expected
    /// to be absorbed by the provider; an `Err` ends the reader loop.
    fn read_and_parse(&self, mode: Mode) -> Result<()>;
}

/// The poller: calls [`PointCloudProvider::read_and_parse`] every
/// [`READ_PERIOD`] until stopped.
pub struct PointCloudReader<P: PointCloudProvider> {
    lidar: Arc<P>,
    worker: Worker,
}

impl<P: PointCloudProvider> PointCloudReader<P> {
    #[allow(missing_docs)]
    pub fn new(lidar: Arc<P>) -> Self {
        Self {
            lidar,
            worker: Worker::new("point cloud reader", READ_PERIOD),
        }
    }

    /// Start decoding `mode` frames. A no-op while already running.
    pub fn start(&mut self, mode: Mode) {
        let lidar = Arc::clone(&self.lidar);
        self.worker.start(move || lidar.read_and_parse(mode));
    }

    /// Stop and wait for the thread. Idempotent.
    pub fn stop(&mut self) {
        self.worker.stop();
    }

    #[allow(missing_docs)]
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    #[allow(missing_docs)]
    pub fn status(&self) -> WorkerStatus {
        self.worker.status()
    }
}
