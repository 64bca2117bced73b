//! Looking inside a recorded session without replaying it.
//!
//! A recording is the raw frame stream exactly as the device sent it. Bytes
//! that do not start a frame are skipped up to the next header and counted,
//! so a capture that began mid frame is still readable.

use crate::cyglidar::{Mode, FRAME_SIZE_2D, FRAME_SIZE_3D};
use crate::error::{LidarError, Result};
use crate::frame::{Frame, HEADER};

use log::debug;
use nom::{bytes::complete::take_until, IResult};
use std::{fmt, fs, path::Path};

/// What [`for_each_frame`] found in a recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Complete frames
    pub frames: usize,
    /// Complete frames whose checksum does not match
    pub bad_checksums: usize,
    /// Bytes skipped while looking for a header
    pub junk_bytes: usize,
    /// Bytes of a frame cut off by the end of the recording
    pub trailing_bytes: usize,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames ({} with a bad checksum), {} junk bytes, {} trailing bytes",
            self.frames, self.bad_checksums, self.junk_bytes, self.trailing_bytes
        )
    }
}

fn skip_to_header(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_until(&HEADER[..])(input)
}

/// Walk every `N` byte frame of `recording`, handing each one to `visit`.
pub fn for_each_frame<const N: usize>(
    mut recording: &[u8],
    mut visit: impl FnMut(&Frame<N>),
) -> SessionSummary {
    let mut summary = SessionSummary::default();

    while !recording.is_empty() {
        match skip_to_header(recording) {
            Ok((rest, junk)) => {
                if !junk.is_empty() {
                    debug!("skipping {} bytes before a header", junk.len());
                }
                summary.junk_bytes += junk.len();
                recording = rest;
            }
            Err(_) => {
                summary.junk_bytes += recording.len();
                break;
            }
        }

        match Frame::<N>::parse(recording) {
            Ok((rest, frame)) => {
                summary.frames += 1;
                if frame.validate_checksum().is_err() {
                    summary.bad_checksums += 1;
                }
                visit(&frame);
                recording = rest;
            }
            Err(_) => {
                // a header with too few bytes behind it can only be the end
                summary.trailing_bytes = recording.len();
                break;
            }
        }
    }

    summary
}

/// Summarise a recording of `mode` frames.
pub fn inspect(recording: &[u8], mode: Mode) -> Result<SessionSummary> {
    match mode {
        Mode::Mode3D => Ok(for_each_frame::<FRAME_SIZE_3D>(recording, |_| {})),
        Mode::Mode2D => Ok(for_each_frame::<FRAME_SIZE_2D>(recording, |_| {})),
        Mode::Dual => Err(LidarError::UnsupportedMode(mode)),
    }
}

/// [`inspect`] a recording on disk.
pub fn inspect_path(path: impl AsRef<Path>, mode: Mode) -> Result<SessionSummary> {
    let recording = fs::read(path)?;
    inspect(&recording, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn clean_recording() {
        let mut recording = Frame::new([1u8, 2, 3, 4]).raw();
        recording.extend(Frame::new([5u8, 6, 7, 8]).raw());

        let mut payloads = Vec::new();
        let summary = for_each_frame::<4>(&recording, |frame| payloads.push(*frame.payload()));

        assert_eq!(payloads, vec![[1, 2, 3, 4], [5, 6, 7, 8]]);
        assert_eq!(
            summary,
            SessionSummary {
                frames: 2,
                ..SessionSummary::default()
            }
        );
    }

    #[test]
    fn junk_between_frames_is_counted() {
        let mut recording = vec![0x00, 0x5A, 0x77];
        recording.extend(Frame::new([9u8, 9]).raw());
        recording.extend([0xAB; 4]);
        recording.extend(Frame::new([7u8, 7]).raw());
        recording.extend([0xCD; 2]);

        let summary = for_each_frame::<2>(&recording, |_| {});
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.junk_bytes, 3 + 4 + 2);
        assert_eq!(summary.trailing_bytes, 0);
    }

    #[test]
    fn bad_checksums_are_reported_not_dropped() {
        let mut recording = Frame::new([1u8, 2]).raw();
        let last = recording.len() - 1;
        recording[last] ^= 0x01;
        recording.extend(Frame::new([3u8, 4]).raw());

        let summary = for_each_frame::<2>(&recording, |_| {});
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.bad_checksums, 1);
    }

    #[test]
    fn truncated_last_frame() {
        let mut recording = Frame::new([1u8; 8]).raw();
        recording.extend(&Frame::new([2u8; 8]).raw()[..6]);

        let summary = for_each_frame::<8>(&recording, |_| {});
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.trailing_bytes, 6);
    }

    #[test]
    fn inspect_a_file_of_2d_frames() {
        let frame = Frame::new([0x11u8; FRAME_SIZE_2D]);
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), frame.raw().repeat(3)).unwrap();

        let summary = inspect_path(file.path(), Mode::Mode2D).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(
            summary.to_string(),
            "3 frames (0 with a bad checksum), 0 junk bytes, 0 trailing bytes"
        );
    }

    #[test]
    fn dual_recordings_are_not_understood() {
        assert!(matches!(
            inspect(&[], Mode::Dual),
            Err(LidarError::UnsupportedMode(Mode::Dual))
        ));
    }
}
