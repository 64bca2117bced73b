//! A [`Transport`] backed by a plain file: the source of a replay, or the
//! sink of a recording.

use super::Transport;
use crate::error::{LidarError, Result};

use log::{debug, info, trace};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Which way the bytes flow through a [`FileStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Read a recorded session back. Writes (device commands) are accepted
    /// and dropped, there is no device on the other end.
    Replay,
    /// Create or truncate the file and append frames to it.
    Record,
}

/// A recorded session on disk. Reads ignore their timeout: a file always has
/// the bytes or is at its end, and the end is a hard error.
#[derive(Debug)]
pub struct FileStream {
    path: PathBuf,
    mode: FileMode,
    pace: Duration,
    file: Mutex<Option<File>>,
}

impl FileStream {
    /// A stream replaying the recording at `path`.
    pub fn replay(path: impl AsRef<Path>) -> Self {
        Self::new(path, FileMode::Replay)
    }

    /// A stream recording into `path`.
    pub fn record(path: impl AsRef<Path>) -> Self {
        Self::new(path, FileMode::Record)
    }

    fn new(path: impl AsRef<Path>, mode: FileMode) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode,
            pace: Duration::ZERO,
            file: Mutex::new(None),
        }
    }

    /// Sleep `pace` on every read so a replay runs close to the cadence the
    /// device produced it at.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Where this stream reads from or writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&self) -> MutexGuard<'_, Option<File>> {
        self.file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for FileStream {
    fn open(&self) -> Result<()> {
        let mut handle = self.handle();
        if handle.is_some() {
            return Ok(());
        }

        let opened = match self.mode {
            FileMode::Replay => File::open(&self.path),
            FileMode::Record => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path),
        };
        let file = opened.map_err(|source| LidarError::Open {
            target: self.path.display().to_string(),
            source,
        })?;

        info!("Opened {} for {:?}", self.path.display(), self.mode);
        *handle = Some(file);
        Ok(())
    }

    fn read(&self, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut handle = self.handle();
        let file = handle.as_mut().ok_or(LidarError::NotOpen)?;

        // read_exact reports a short file as UnexpectedEof, which is exactly
        // the hard error a finite recording ends with
        file.read_exact(buffer)?;
        drop(handle);

        if !self.pace.is_zero() {
            thread::sleep(self.pace);
        }
        Ok(buffer.len())
    }

    fn write(&self, buffer: &[u8], discard: bool) -> Result<()> {
        if discard {
            return Ok(());
        }
        if self.mode == FileMode::Replay {
            trace!("replay of {} ignores {} written bytes", self.path.display(), buffer.len());
            return Ok(());
        }

        let mut handle = self.handle();
        let file = handle.as_mut().ok_or(LidarError::NotOpen)?;
        file.write_all(buffer)?;
        file.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(mut file) = self.handle().take() {
            debug!("Closing {}", self.path.display());
            if self.mode == FileMode::Record {
                file.flush().map_err(LidarError::Io)?;
            }
        }
        Ok(())
    }
}
