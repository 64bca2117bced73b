//! The CygLidar wire frame: a fixed header, a little-endian length, a payload
//! of `N` bytes and an XOR checksum.
//!
//! ```text
//! 5A 77 FF | len_lo len_hi | payload[0..N] | checksum
//! ```
//!
//! The checksum is the XOR of the two length bytes and every payload byte.
//! Frames are built from a payload ([`Frame::new`]), read from a live
//! [`IoStream`] ([`Frame::read`]), or parsed out of an in-memory recording
//! ([`Frame::parse`]). Reading does not verify the checksum; callers that
//! care call [`Frame::validate_checksum`].

use crate::error::{LidarError, Result};
use crate::transport::IoStream;

use log::warn;
use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_u16, u8 as byte},
    IResult,
};
use std::fmt;
use std::time::{Duration, Instant};

/// Magic bytes every frame starts with.
pub const HEADER: [u8; 3] = [0x5A, 0x77, 0xFF];

// Every timeout below bounds a silence on the line, not the whole transfer:
// a 3D body takes over half a second at 250000 baud.

/// Longest wait for the header bytes.
pub const HEADER_TIMEOUT: Duration = Duration::from_millis(130);
/// Longest wait for the two length bytes, which follow the header immediately.
pub const LENGTH_TIMEOUT: Duration = Duration::from_millis(1);
/// Longest gap tolerated between chunks of payload plus checksum.
pub const PAYLOAD_TIMEOUT: Duration = Duration::from_millis(6);

/// One frame carrying exactly `N` payload bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame<const N: usize> {
    payload: [u8; N],
    checksum: u8,
}

impl<const N: usize> Frame<N> {
    /// Value of the length field.
    pub const LENGTH: u16 = {
        assert!(N <= u16::MAX as usize, "frame payload does not fit the length field");
        N as u16
    };

    /// Size of the whole frame on the wire.
    pub const RAW_SIZE: usize = HEADER.len() + 2 + N + 1;

    /// Build a frame around `payload`, computing its checksum.
    pub fn new(payload: [u8; N]) -> Self {
        let checksum = Self::compute_checksum(&payload);
        Self { payload, checksum }
    }

    /// XOR over the length field and `payload`.
    pub fn compute_checksum(payload: &[u8; N]) -> u8 {
        Self::LENGTH
            .to_le_bytes()
            .iter()
            .chain(payload.iter())
            .fold(0, |acc, b| acc ^ b)
    }

    /// The magic header.
    pub fn header(&self) -> [u8; 3] {
        HEADER
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8; N] {
        &self.payload
    }

    /// Payload size, which is also what the length field carries.
    pub fn size(&self) -> usize {
        N
    }

    /// The checksum this frame carries: computed for frames built locally,
    /// as received for frames that were read.
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Check the carried checksum against the payload.
    pub fn validate_checksum(&self) -> Result<()> {
        let expected = Self::compute_checksum(&self.payload);
        if expected == self.checksum {
            Ok(())
        } else {
            Err(LidarError::ChecksumInvalid {
                expected,
                actual: self.checksum,
            })
        }
    }

    /// The frame exactly as it goes over the wire.
    pub fn raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(Self::RAW_SIZE);
        raw.extend_from_slice(&HEADER);
        raw.extend_from_slice(&Self::LENGTH.to_le_bytes());
        raw.extend_from_slice(&self.payload);
        raw.push(self.checksum);
        raw
    }

    /// Send the whole frame with a single transport write.
    pub fn write(&self, io: &IoStream) -> Result<()> {
        io.write(&self.raw())
    }

    /// Read one frame off `io`.
    ///
    /// A length field that disagrees with `N` is logged and otherwise
    /// ignored: the device answers some requests with a nominal length that
    /// differs from the frame it actually sends, and recorded sessions carry
    /// such frames too. The stream stays aligned because the field has a
    /// fixed width.
    pub fn read(io: &IoStream) -> Result<Self> {
        let mut header = [0u8; HEADER.len()];
        let received = read_within(io, &mut header, HEADER_TIMEOUT)?;
        if received != header.len() || header != HEADER {
            return Err(LidarError::BadHeader(header[..received].to_vec()));
        }

        let mut length = [0u8; 2];
        let received = read_within(io, &mut length, LENGTH_TIMEOUT)?;
        if received != length.len() {
            return Err(LidarError::BadLength { received });
        }
        let announced = u16::from_le_bytes(length);
        if announced != Self::LENGTH {
            warn!(
                "frame announced {} payload bytes, expected {}; reading {} anyway",
                announced,
                Self::LENGTH,
                N
            );
        }

        let mut rest = vec![0u8; N + 1];
        let received = read_within(io, &mut rest, PAYLOAD_TIMEOUT)?;
        if received != rest.len() {
            return Err(LidarError::Timeout {
                expected: rest.len(),
                received,
            });
        }

        let mut payload = [0u8; N];
        payload.copy_from_slice(&rest[..N]);
        Ok(Self {
            payload,
            checksum: rest[N],
        })
    }

    /// Parse one frame from the front of `input`, with the same tolerance
    /// for a disagreeing length field as [`Frame::read`].
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&HEADER[..])(input)?;
        let (input, announced) = le_u16(input)?;
        let (input, body) = take(N)(input)?;
        if announced != Self::LENGTH {
            warn!(
                "recorded frame announced {} payload bytes, expected {}",
                announced,
                Self::LENGTH
            );
        }
        let (input, checksum) = byte(input)?;

        let mut payload = [0u8; N];
        payload.copy_from_slice(body);
        Ok((input, Self { payload, checksum }))
    }
}

impl<const N: usize> Default for Frame<N> {
    fn default() -> Self {
        Self::new([0; N])
    }
}

impl<const N: usize> fmt::Debug for Frame<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = &self.payload[..N.min(8)];
        f.debug_struct("Frame")
            .field("length", &N)
            .field("payload", &format_args!("{preview:02X?}{}", if N > 8 { ".." } else { "" }))
            .field("checksum", &format_args!("{:#04x}", self.checksum))
            .finish()
    }
}

/// Keep reading into `buffer` until it is full or nothing has arrived for
/// `timeout`, returning how much arrived. Every chunk restarts the wait, and
/// at least one read is always issued.
fn read_within(io: &IoStream, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
    let mut deadline = Instant::now() + timeout;
    let mut filled = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let received = io.read(&mut buffer[filled..], remaining)?;
        filled += received;
        if filled == buffer.len() {
            return Ok(filled);
        }

        let now = Instant::now();
        if received > 0 {
            deadline = now + timeout;
        } else if now >= deadline {
            return Ok(filled);
        }
    }
}
