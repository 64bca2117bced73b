//! Scriptable in-memory transport for unit tests.

use super::Transport;
use crate::error::{LidarError, Result};

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Clones share the same state, so a test can keep one handle while the
/// code under test owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Default)]
struct MockInner {
    incoming: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    discarded: usize,
    chunk: Option<usize>,
    pace: Option<Duration>,
    eof_when_empty: bool,
    writes_before_failure: Option<usize>,
    open_calls: usize,
    close_calls: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be handed out by `read`.
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().unwrap().incoming.extend(data);
    }

    /// Hand out at most `chunk` bytes per `read` call.
    pub fn set_chunk(&self, chunk: usize) {
        self.inner.lock().unwrap().chunk = Some(chunk);
    }

    /// Sleep this long before every `read` that hands out bytes, like a line
    /// delivering `chunk` bytes per `pace`.
    pub fn set_pace(&self, pace: Duration) {
        self.inner.lock().unwrap().pace = Some(pace);
    }

    /// Report a hard error instead of a timeout once the input runs dry.
    pub fn set_eof_when_empty(&self) {
        self.inner.lock().unwrap().eof_when_empty = true;
    }

    /// Let `count` writes through, then fail every following one.
    pub fn fail_writes_after(&self, count: usize) {
        self.inner.lock().unwrap().writes_before_failure = Some(count);
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().written.clone()
    }

    pub fn discarded_writes(&self) -> usize {
        self.inner.lock().unwrap().discarded
    }

    pub fn open_calls(&self) -> usize {
        self.inner.lock().unwrap().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.inner.lock().unwrap().close_calls
    }
}

impl Transport for MockTransport {
    fn open(&self) -> Result<()> {
        self.inner.lock().unwrap().open_calls += 1;
        Ok(())
    }

    fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.incoming.is_empty() {
            if inner.eof_when_empty {
                return Err(LidarError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "mock input exhausted",
                )));
            }
            drop(inner);
            thread::sleep(timeout);
            return Ok(0);
        }

        if let Some(pace) = inner.pace {
            drop(inner);
            thread::sleep(pace);
            inner = self.inner.lock().unwrap();
        }

        let limit = inner.chunk.unwrap_or(usize::MAX);
        let count = buffer.len().min(limit).min(inner.incoming.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.incoming.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&self, buffer: &[u8], discard: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(remaining) = inner.writes_before_failure {
            if remaining == 0 {
                return Err(LidarError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "mock write failure",
                )));
            }
            inner.writes_before_failure = Some(remaining - 1);
        }
        if discard {
            inner.discarded += 1;
        } else {
            inner.written.push(buffer.to_vec());
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.inner.lock().unwrap().close_calls += 1;
        Ok(())
    }
}
