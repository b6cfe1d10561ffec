//! Frame reader for extracting frames from buffered pipe input.
//!
//! The reader is stateless: it either takes one whole frame off the front of
//! the input or leaves the input untouched so the caller can buffer more
//! bytes and retry.
//!
//! # Example
//!
//! ```
//! use wspipe::protocol::{build_frame, ByteSequence, FrameReader};
//!
//! let reader = FrameReader::new();
//! let mut input = ByteSequence::from(build_frame(b"hi", true));
//!
//! let frame = reader.read_frame(&mut input).unwrap().unwrap();
//! assert_eq!(frame.payload_bytes().as_ref(), b"hi");
//! assert!(frame.is_end_of_message());
//! assert!(input.is_empty());
//! ```

use tracing::warn;

use super::frame::Frame;
use super::sequence::ByteSequence;
use super::wire_format::{
    decode_flag, decode_length, validate_length, FLAG_SIZE, LENGTH_PREFIX_SIZE,
};
use crate::config::DEFAULT_MAX_FRAME_SIZE;
use crate::error::Result;

/// Extracts frames from a [`ByteSequence`].
#[derive(Debug, Clone, Copy)]
pub struct FrameReader {
    max_frame_size: u32,
}

impl FrameReader {
    /// Create a reader accepting payloads up to `DEFAULT_MAX_FRAME_SIZE`.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a reader with a custom maximum payload length.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self { max_frame_size }
    }

    /// Maximum accepted payload length.
    #[inline]
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Try to take one frame off the front of `input`.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` and advances `input` past the frame
    /// - `Ok(None)` if the frame is not fully buffered yet (input untouched)
    /// - `Err(...)` if the length exceeds the maximum or the flag byte is invalid
    pub fn read_frame(&self, input: &mut ByteSequence) -> Result<Option<Frame>> {
        if input.len() <= LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        if !input.peek_into(&mut prefix) {
            return Ok(None);
        }
        let length = decode_length(prefix);

        if let Err(e) = validate_length(length, self.max_frame_size) {
            warn!(length, max = self.max_frame_size, "Rejecting oversized frame");
            return Err(e);
        }

        let length = length as usize;
        let flag_index = LENGTH_PREFIX_SIZE + length;
        if input.len() < flag_index + FLAG_SIZE {
            return Ok(None);
        }

        let flag = input.byte_at(flag_index).unwrap_or_default();
        let end_of_message = decode_flag(flag)?;

        let _ = input.split_to(LENGTH_PREFIX_SIZE);
        let payload = input.split_to(length);
        let _ = input.split_to(FLAG_SIZE);

        Ok(Some(Frame::new(payload, end_of_message)))
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::protocol::frame::{build_frame, build_message};

    fn split_into_segments(bytes: &[u8], at: &[usize]) -> ByteSequence {
        let mut sequence = ByteSequence::new();
        let mut start = 0;
        for &end in at {
            sequence.push(Bytes::copy_from_slice(&bytes[start..end]));
            start = end;
        }
        sequence.push(Bytes::copy_from_slice(&bytes[start..]));
        sequence
    }

    #[test]
    fn test_single_frame() {
        let reader = FrameReader::new();
        let mut input = ByteSequence::from(build_frame(b"hello", false));

        let frame = reader.read_frame(&mut input).unwrap().unwrap();
        assert_eq!(frame.payload.to_vec(), b"hello");
        assert!(!frame.is_end_of_message());
        assert!(input.is_empty());
    }

    #[test]
    fn test_prefix_only_is_incomplete() {
        let reader = FrameReader::new();
        let mut input = ByteSequence::from(vec![0, 0, 0, 0]);
        assert!(reader.read_frame(&mut input).unwrap().is_none());
        assert_eq!(input.len(), 4);
    }

    #[test]
    fn test_missing_flag_is_incomplete() {
        let reader = FrameReader::new();
        let bytes = build_frame(b"abc", true);
        let mut input = ByteSequence::from(bytes[..bytes.len() - 1].to_vec());

        assert!(reader.read_frame(&mut input).unwrap().is_none());
        assert_eq!(input.len(), 7);
    }

    #[test]
    fn test_empty_end_of_message_frame() {
        let reader = FrameReader::new();
        let mut input = ByteSequence::from(vec![0, 0, 0, 0, 1]);

        let frame = reader.read_frame(&mut input).unwrap().unwrap();
        assert_eq!(frame.payload_len(), 0);
        assert!(frame.is_end_of_message());
        assert!(input.is_empty());
    }

    #[test]
    fn test_frame_spanning_segments() {
        let reader = FrameReader::new();
        let bytes = build_frame(b"Ping", true);
        let mut input = split_into_segments(&bytes, &[2, 6]);

        let frame = reader.read_frame(&mut input).unwrap().unwrap();
        assert_eq!(frame.payload.to_vec(), b"Ping");
        assert!(frame.is_end_of_message());
    }

    #[test]
    fn test_every_split_point_yields_same_frames() {
        let reader = FrameReader::new();
        let bytes = build_message([&b"Pi"[..], &b"ng"[..]]);

        for split in 1..bytes.len() {
            let mut input = split_into_segments(&bytes, &[split]);
            let first = reader.read_frame(&mut input).unwrap().unwrap();
            let second = reader.read_frame(&mut input).unwrap().unwrap();

            assert_eq!(first.payload.to_vec(), b"Pi");
            assert!(!first.is_end_of_message());
            assert_eq!(second.payload.to_vec(), b"ng");
            assert!(second.is_end_of_message());
            assert!(input.is_empty());
        }
    }

    #[test]
    fn test_trailing_bytes_left_in_input() {
        let reader = FrameReader::new();
        let mut bytes = build_frame(b"x", true);
        bytes.extend_from_slice(&[0, 0, 0]);
        let mut input = ByteSequence::from(bytes);

        reader.read_frame(&mut input).unwrap().unwrap();
        assert_eq!(input.to_vec(), vec![0, 0, 0]);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let reader = FrameReader::with_max_frame_size(4);
        let mut input = ByteSequence::from(build_frame(b"too long", true));

        let err = reader.read_frame(&mut input).unwrap_err();
        assert!(err.is_framing_error());
    }

    #[test]
    fn test_invalid_flag_rejected() {
        let reader = FrameReader::new();
        let mut input = ByteSequence::from(vec![0, 0, 0, 1, b'a', 7]);

        let err = reader.read_frame(&mut input).unwrap_err();
        assert!(err.to_string().contains("flag"));
    }
}
