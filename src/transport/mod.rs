//! Byte level transports the frame codec rides on: a live serial line or a
//! file holding a recorded session.

use crate::error::Result;

use log::debug;
use std::time::Duration;

mod file_stream;
#[cfg(test)]
pub(crate) mod mock;
mod serial_port;

pub use file_stream::{FileMode, FileStream};
pub use serial_port::SerialPortStream;

/// `Transport`
///
/// The open / read / write / close capability every byte source implements.
/// All methods take `&self`; implementations serialize their own access so a
/// transport can be shared between the thread issuing commands and the
/// thread decoding frames.
pub trait Transport: Send + Sync {
    /// Acquire the underlying resource.
    fn open(&self) -> Result<()>;

    /// Fill as much of `buffer` as possible and report how many bytes
    /// arrived. Returning fewer bytes than requested means nothing arrived
    /// for `timeout`; hard failures (including the end of a finite file) are
    /// errors.
    fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write the whole buffer. With `discard` set the call succeeds without
    /// performing any I/O.
    fn write(&self, buffer: &[u8], discard: bool) -> Result<()>;

    /// Release the underlying resource. Must be safe to call repeatedly.
    fn close(&self) -> Result<()>;
}

/// Owning handle around a boxed [`Transport`]. Dropping it closes the
/// transport exactly once and swallows whatever that close reports.
pub struct IoStream {
    inner: Box<dyn Transport>,
}

impl IoStream {
    /// Wrap an already constructed transport without opening it.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            inner: Box::new(transport),
        }
    }

    /// Wrap a transport and open it straight away.
    pub fn create_and_open<T: Transport + 'static>(transport: T) -> Result<Self> {
        let stream = Self::new(transport);
        stream.open()?;
        Ok(stream)
    }

    /// See [`Transport::open`].
    pub fn open(&self) -> Result<()> {
        self.inner.open()
    }

    /// See [`Transport::read`].
    pub fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        self.inner.read(buffer, timeout)
    }

    /// See [`Transport::write`]; this variant always performs the I/O.
    pub fn write(&self, buffer: &[u8]) -> Result<()> {
        self.inner.write(buffer, false)
    }

    /// See [`Transport::write`].
    pub fn write_or_discard(&self, buffer: &[u8], discard: bool) -> Result<()> {
        self.inner.write(buffer, discard)
    }

    /// See [`Transport::close`].
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

impl Drop for IoStream {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            debug!("ignoring error while closing transport: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[test]
    fn open_is_forwarded() {
        let mock = MockTransport::new();
        let stream = IoStream::new(mock.clone());
        stream.open().unwrap();
        assert_eq!(mock.open_calls(), 1);
    }

    #[test]
    fn create_and_open_opens_once() {
        let mock = MockTransport::new();
        let _stream = IoStream::create_and_open(mock.clone()).unwrap();
        assert_eq!(mock.open_calls(), 1);
    }

    #[test]
    fn drop_closes_exactly_once() {
        let mock = MockTransport::new();
        {
            let stream = IoStream::new(mock.clone());
            stream.close().unwrap();
        }
        // one explicit close plus the one from drop
        assert_eq!(mock.close_calls(), 2);
    }

    #[test]
    fn write_and_read_are_forwarded() {
        let mock = MockTransport::new();
        mock.inject_read(&[1, 2, 3, 4]);
        let stream = IoStream::new(mock.clone());

        stream.write(&[9, 8, 7]).unwrap();
        stream.write_or_discard(&[6, 6], true).unwrap();

        let mut buf = [0u8; 4];
        let n = stream.read(&mut buf, Duration::from_millis(5)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(mock.written(), vec![vec![9, 8, 7]]);
        assert_eq!(mock.discarded_writes(), 1);
    }
}
