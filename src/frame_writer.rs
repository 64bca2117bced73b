//! Mirrors the latest decoded frame to an output transport from a background
//! thread.
//!
//! Mirroring is best effort: nothing ties the writer's cadence to the
//! reader's, so a frame may be written more than once or skipped.

use crate::cyglidar::Mode;
use crate::transport::IoStream;
use crate::worker::{Worker, WorkerStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pause between two writes.
pub const WRITE_PERIOD: Duration = Duration::from_millis(5);

/// Something holding a most recent frame.
pub trait FrameProvider: Send + Sync + 'static {
    /// Wire bytes of the newest `mode` frame, `None` if there is none yet.
    fn latest_raw_frame(&self, mode: Mode) -> Option<Vec<u8>>;
}

/// The recorder.
pub struct FrameWriter<P: FrameProvider> {
    lidar: Arc<P>,
    output: Arc<IoStream>,
    mode: Mode,
    muted: Arc<AtomicBool>,
    worker: Worker,
}

impl<P: FrameProvider> FrameWriter<P> {
    /// Record `mode` frames from `lidar` into `output`.
    pub fn new(lidar: Arc<P>, output: Arc<IoStream>, mode: Mode) -> Self {
        Self {
            lidar,
            output,
            mode,
            muted: Arc::new(AtomicBool::new(false)),
            worker: Worker::new("frame writer", WRITE_PERIOD),
        }
    }

    /// Start recording. A no-op while already running.
    pub fn start(&mut self) {
        let lidar = Arc::clone(&self.lidar);
        let output = Arc::clone(&self.output);
        let muted = Arc::clone(&self.muted);
        let mode = self.mode;

        self.worker.start(move || {
            // the copy is taken under the provider's lock, the write happens
            // outside of it
            match lidar.latest_raw_frame(mode) {
                Some(raw) => output.write_or_discard(&raw, muted.load(Ordering::Relaxed)),
                None => Ok(()),
            }
        });
    }

    /// Stop and wait for the thread. Idempotent.
    pub fn stop(&mut self) {
        self.worker.stop();
    }

    /// While muted the loop keeps running but its writes are discarded.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Flip the mute switch, returning the new state.
    pub fn toggle_mute(&self) -> bool {
        !self.muted.fetch_xor(true, Ordering::Relaxed)
    }

    #[allow(missing_docs)]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
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
