//! The live device: a serial line opened through `serial2` and configured by
//! [`line_config`](crate::line_config).

use super::Transport;
use crate::error::{LidarError, Result};
use crate::line_config::{self, LineControl, Tty};

use log::{debug, info};
use serial2::{KeepSettings, SerialPort};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

type LineFactory = Box<dyn Fn(RawFd) -> Box<dyn LineControl> + Send + Sync>;

/// A serial port carrying the CygLidar protocol.
pub struct SerialPortStream {
    path: PathBuf,
    baud_rate: u32,
    line: LineFactory,
    port: Mutex<Option<SerialPort>>,
}

impl SerialPortStream {
    /// Describe the port at `path`; nothing is touched until `open()`.
    pub fn new(path: impl AsRef<Path>, baud_rate: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            baud_rate,
            line: Box::new(|fd: RawFd| -> Box<dyn LineControl> { Box::new(Tty(fd)) }),
            port: Mutex::new(None),
        }
    }

    /// Configure the line through `line` instead of the tty ioctls.
    pub fn with_line_control<F>(mut self, line: F) -> Self
    where
        F: Fn(RawFd) -> Box<dyn LineControl> + Send + Sync + 'static,
    {
        self.line = Box::new(line);
        self
    }

    /// The serial devices the operating system knows about.
    pub fn available_ports() -> Result<Vec<PathBuf>> {
        Ok(SerialPort::available_ports()?)
    }

    /// The baud rate the line is configured with on `open()`.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn handle(&self) -> MutexGuard<'_, Option<SerialPort>> {
        self.port
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wait until `fd` has bytes to read. `false` means the timeout expired.
fn poll_readable(fd: RawFd, timeout: Duration) -> Result<bool> {
    let millis = timeout.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        // SAFETY: a single, valid pollfd for the duration of the call
        let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ret < 0 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(LidarError::Io(error));
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(LidarError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("serial line reported poll events {:#x}", pfd.revents),
            )));
        }
        return Ok(ret > 0 && pfd.revents & libc::POLLIN != 0);
    }
}

impl Transport for SerialPortStream {
    fn open(&self) -> Result<()> {
        let mut handle = self.handle();
        if handle.is_some() {
            return Ok(());
        }

        let port = SerialPort::open(&self.path, KeepSettings).map_err(|source| LidarError::Open {
            target: self.path.display().to_string(),
            source,
        })?;

        // a port that refuses the line settings is never kept, so nothing can
        // be written to a device talking at the wrong speed
        let line = (self.line)(port.as_raw_fd());
        line_config::configure(&*line, self.baud_rate)?;

        info!("Opened {} at {} baud", self.path.display(), self.baud_rate);
        *handle = Some(port);
        Ok(())
    }

    // Holds the port for the whole read, so a command written from another
    // thread waits until the line goes quiet or the buffer fills.
    fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let handle = self.handle();
        let port = handle.as_ref().ok_or(LidarError::NotOpen)?;
        let fd = port.as_raw_fd();
        let mut deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buffer.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !poll_readable(fd, remaining)? {
                debug!(
                    "{} silent for {:?} after {} of {} bytes",
                    self.path.display(),
                    timeout,
                    filled,
                    buffer.len()
                );
                break;
            }

            match port.read(&mut buffer[filled..]) {
                Ok(0) => {
                    return Err(LidarError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial port hung up",
                    )))
                }
                Ok(n) => {
                    filled += n;
                    deadline = Instant::now() + timeout;
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
                Err(e) => return Err(LidarError::Io(e)),
            }
        }

        Ok(filled)
    }

    fn write(&self, buffer: &[u8], discard: bool) -> Result<()> {
        if discard {
            return Ok(());
        }
        let handle = self.handle();
        let port = handle.as_ref().ok_or(LidarError::NotOpen)?;
        port.write_all(buffer)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(port) = self.handle().take() {
            info!("Closing {}", self.path.display());
            drop(port);
        }
        Ok(())
    }
}
