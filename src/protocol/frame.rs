//! Decoded frame and contiguous frame builders.
//!
//! A [`Frame`] is one length-prefixed chunk of a message. Its payload is a
//! [`ByteSequence`] slice of the pipe buffer it was read from, so it may span
//! several segments.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use wspipe::protocol::{build_frame, Frame};
//!
//! let bytes = build_frame(b"hello", true);
//! assert_eq!(bytes, [0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o', 1]);
//!
//! let frame = Frame::new(Bytes::from_static(b"hello").into(), true);
//! assert_eq!(frame.payload_len(), 5);
//! assert!(frame.is_end_of_message());
//! ```

use bytes::{Bytes, BytesMut};

use super::sequence::ByteSequence;
use super::wire_format::{encode_flag, encode_length, encoded_len};

/// A single decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes, possibly multi-segment.
    pub payload: ByteSequence,
    /// Whether this frame completes its message.
    pub end_of_message: bool,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: ByteSequence, end_of_message: bool) -> Self {
        Self {
            payload,
            end_of_message,
        }
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Check if this is the last frame of a message.
    #[inline]
    pub fn is_end_of_message(&self) -> bool {
        self.end_of_message
    }

    /// Contiguous payload (zero-copy when single-segment).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.to_bytes()
    }

    /// Re-encode this frame into its wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(encoded_len(self.payload.len()));
        buf.extend_from_slice(&encode_length(self.payload.len() as u32));
        for segment in self.payload.segments() {
            buf.extend_from_slice(segment);
        }
        buf.extend_from_slice(&[encode_flag(self.end_of_message)]);
        buf.freeze()
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use wspipe::protocol::{build_frame, FRAME_OVERHEAD};
///
/// let bytes = build_frame(b"", false);
/// assert_eq!(bytes.len(), FRAME_OVERHEAD);
/// ```
pub fn build_frame(payload: &[u8], end_of_message: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(payload.len()));
    buf.extend_from_slice(&encode_length(payload.len() as u32));
    buf.extend_from_slice(payload);
    buf.push(encode_flag(end_of_message));
    buf
}

/// Frame a whole message split into the given chunks.
///
/// Every chunk but the last gets flag `0`; an empty chunk list yields a
/// single empty final frame.
pub fn build_message<'a, I>(chunks: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let chunks: Vec<&[u8]> = chunks.into_iter().collect();
    if chunks.is_empty() {
        return build_frame(&[], true);
    }

    let last = chunks.len() - 1;
    let mut out = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        out.extend_from_slice(&build_frame(chunk, index == last));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(ByteSequence::from(&b"abc"[..]), false);
        assert_eq!(frame.payload_len(), 3);
        assert!(!frame.is_end_of_message());
        assert_eq!(frame.payload_bytes(), Bytes::from_static(b"abc"));
    }

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(b"Pi", false);
        assert_eq!(bytes, vec![0, 0, 0, 2, b'P', b'i', 0]);

        let bytes = build_frame(b"", true);
        assert_eq!(bytes, vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_encode_multi_segment_payload() {
        let mut payload = ByteSequence::from(&b"Pi"[..]);
        payload.push(Bytes::from_static(b"ng"));
        let frame = Frame::new(payload, true);

        assert_eq!(frame.encode().as_ref(), build_frame(b"Ping", true).as_slice());
    }

    #[test]
    fn test_build_message() {
        let bytes = build_message([&b"Pi"[..], &b"ng"[..]]);
        assert_eq!(
            bytes,
            vec![0, 0, 0, 2, b'P', b'i', 0, 0, 0, 0, 2, b'n', b'g', 1]
        );

        let empty = build_message(std::iter::empty());
        assert_eq!(empty, vec![0, 0, 0, 0, 1]);
    }
}
