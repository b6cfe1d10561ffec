//! Multi-segment byte sequences.
//!
//! A [`ByteSequence`] is a logically contiguous run of bytes stored as a
//! queue of `bytes::Bytes` segments. Slicing and concatenation never copy
//! payload bytes; only [`ByteSequence::to_bytes`] on a multi-segment
//! sequence does.
//!
//! # Example
//!
//! ```
//! use bytes::{Buf, Bytes};
//! use wspipe::protocol::{ByteSequence, SequenceBuilder};
//!
//! let mut builder = SequenceBuilder::new();
//! builder.append_bytes(Bytes::from_static(b"Pi"));
//! builder.append_bytes(Bytes::from_static(b"ng"));
//!
//! let mut sequence = builder.build();
//! assert_eq!(sequence.len(), 4);
//! assert!(!sequence.is_single_segment());
//! assert_eq!(sequence.copy_to_bytes(4), Bytes::from_static(b"Ping"));
//! ```

use std::collections::VecDeque;
use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

/// A byte sequence made of one or more `Bytes` segments.
#[derive(Clone, Default)]
pub struct ByteSequence {
    segments: VecDeque<Bytes>,
    len: usize,
}

impl ByteSequence {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the sequence holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of backing segments.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Whether all bytes live in a single segment.
    #[inline]
    pub fn is_single_segment(&self) -> bool {
        self.segments.len() <= 1
    }

    /// Iterate over the backing segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &Bytes> {
        self.segments.iter()
    }

    /// Append a segment at the end. Empty segments are ignored.
    pub fn push(&mut self, segment: Bytes) {
        if segment.is_empty() {
            return;
        }
        self.len += segment.len();
        self.segments.push_back(segment);
    }

    /// Append every segment of another sequence.
    pub fn extend(&mut self, other: ByteSequence) {
        for segment in other.segments {
            self.push(segment);
        }
    }

    /// Split off the first `at` bytes, leaving the rest in `self`.
    ///
    /// # Panics
    ///
    /// Panics if `at > self.len()`.
    pub fn split_to(&mut self, at: usize) -> ByteSequence {
        assert!(
            at <= self.len,
            "split_to out of bounds: {} > {}",
            at,
            self.len
        );

        let mut head = ByteSequence::new();
        let mut remaining = at;

        while remaining > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };

            if front.len() <= remaining {
                remaining -= front.len();
                if let Some(segment) = self.segments.pop_front() {
                    head.push(segment);
                }
            } else {
                head.push(front.split_to(remaining));
                remaining = 0;
            }
        }

        self.len -= at;
        head
    }

    /// Copy the first `dst.len()` bytes into `dst` without consuming them.
    ///
    /// Returns `false` if fewer bytes are available.
    pub fn peek_into(&self, dst: &mut [u8]) -> bool {
        if dst.len() > self.len {
            return false;
        }

        let mut filled = 0;
        for segment in &self.segments {
            if filled == dst.len() {
                break;
            }
            let take = (dst.len() - filled).min(segment.len());
            dst[filled..filled + take].copy_from_slice(&segment[..take]);
            filled += take;
        }
        true
    }

    /// Byte at `index`, if present.
    pub fn byte_at(&self, index: usize) -> Option<u8> {
        if index >= self.len {
            return None;
        }

        let mut offset = index;
        for segment in &self.segments {
            if offset < segment.len() {
                return Some(segment[offset]);
            }
            offset -= segment.len();
        }
        None
    }

    /// Position of the first occurrence of `needle`.
    pub fn position(&self, needle: u8) -> Option<usize> {
        let mut base = 0;
        for segment in &self.segments {
            if let Some(index) = segment.iter().position(|&b| b == needle) {
                return Some(base + index);
            }
            base += segment.len();
        }
        None
    }

    /// Contiguous view of the whole sequence.
    ///
    /// Zero-copy for single-segment sequences; copies otherwise.
    pub fn to_bytes(&self) -> Bytes {
        match self.segments.len() {
            0 => Bytes::new(),
            1 => self.segments[0].clone(),
            _ => {
                let mut out = BytesMut::with_capacity(self.len);
                for segment in &self.segments {
                    out.extend_from_slice(segment);
                }
                out.freeze()
            }
        }
    }

    /// Copy the whole sequence into a `Vec`.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }
}

impl Buf for ByteSequence {
    fn remaining(&self) -> usize {
        self.len
    }

    fn chunk(&self) -> &[u8] {
        self.segments.front().map(|s| s.as_ref()).unwrap_or(&[])
    }

    fn advance(&mut self, cnt: usize) {
        let _ = self.split_to(cnt);
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        self.split_to(len).to_bytes()
    }
}

impl From<Bytes> for ByteSequence {
    fn from(bytes: Bytes) -> Self {
        let mut sequence = ByteSequence::new();
        sequence.push(bytes);
        sequence
    }
}

impl From<Vec<u8>> for ByteSequence {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static [u8]> for ByteSequence {
    fn from(bytes: &'static [u8]) -> Self {
        Bytes::from_static(bytes).into()
    }
}

impl PartialEq for ByteSequence {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for ByteSequence {}

impl PartialEq<[u8]> for ByteSequence {
    fn eq(&self, other: &[u8]) -> bool {
        self.len == other.len() && self.to_bytes() == other
    }
}

impl fmt::Debug for ByteSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSequence")
            .field("len", &self.len)
            .field("segments", &self.segments.len())
            .finish()
    }
}

/// Append-only builder that concatenates sequences without copying.
#[derive(Debug, Default)]
pub struct SequenceBuilder {
    sequence: ByteSequence,
}

impl SequenceBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append all segments of `sequence`.
    pub fn append(&mut self, sequence: ByteSequence) {
        self.sequence.extend(sequence);
    }

    /// Append a single segment.
    pub fn append_bytes(&mut self, bytes: Bytes) {
        self.sequence.push(bytes);
    }

    /// Bytes appended so far.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Check if nothing was appended yet.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Finish building.
    pub fn build(self) -> ByteSequence {
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_segments() -> ByteSequence {
        let mut sequence = ByteSequence::from(Bytes::from_static(b"hello "));
        sequence.push(Bytes::from_static(b"world"));
        sequence
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let mut sequence = ByteSequence::new();
        sequence.push(Bytes::new());
        assert!(sequence.is_empty());
        assert_eq!(sequence.segment_count(), 0);
        assert!(sequence.is_single_segment());
    }

    #[test]
    fn test_split_across_segments() {
        let mut sequence = two_segments();
        let head = sequence.split_to(8);

        assert_eq!(head.len(), 8);
        assert_eq!(head.segment_count(), 2);
        assert_eq!(head.to_vec(), b"hello wo");
        assert_eq!(sequence.to_vec(), b"rld");
    }

    #[test]
    fn test_split_at_segment_boundary() {
        let mut sequence = two_segments();
        let head = sequence.split_to(6);

        assert!(head.is_single_segment());
        assert_eq!(head.to_vec(), b"hello ");
        assert!(sequence.is_single_segment());
        assert_eq!(sequence.len(), 5);
    }

    #[test]
    #[should_panic(expected = "split_to out of bounds")]
    fn test_split_out_of_bounds() {
        let mut sequence = two_segments();
        let _ = sequence.split_to(100);
    }

    #[test]
    fn test_peek_across_segments() {
        let sequence = two_segments();
        let mut buf = [0u8; 8];
        assert!(sequence.peek_into(&mut buf));
        assert_eq!(&buf, b"hello wo");
        assert_eq!(sequence.len(), 11);

        let mut too_big = [0u8; 12];
        assert!(!sequence.peek_into(&mut too_big));
    }

    #[test]
    fn test_byte_at_and_position() {
        let sequence = two_segments();
        assert_eq!(sequence.byte_at(0), Some(b'h'));
        assert_eq!(sequence.byte_at(6), Some(b'w'));
        assert_eq!(sequence.byte_at(11), None);
        assert_eq!(sequence.position(b'r'), Some(8));
        assert_eq!(sequence.position(b'z'), None);
    }

    #[test]
    fn test_to_bytes_single_segment_is_zero_copy() {
        let original = Bytes::from_static(b"zero copy");
        let sequence = ByteSequence::from(original.clone());
        assert_eq!(sequence.to_bytes().as_ptr(), original.as_ptr());
    }

    #[test]
    fn test_buf_impl() {
        let mut sequence = ByteSequence::from(Bytes::from_static(&[0, 0]));
        sequence.push(Bytes::from_static(&[1, 2, 9]));

        assert_eq!(sequence.get_u32(), 0x0000_0102);
        assert_eq!(sequence.remaining(), 1);
        assert_eq!(sequence.chunk(), &[9]);
    }

    #[test]
    fn test_builder_concatenates() {
        let mut builder = SequenceBuilder::new();
        assert!(builder.is_empty());

        builder.append(two_segments());
        builder.append_bytes(Bytes::from_static(b"!"));
        assert_eq!(builder.len(), 12);

        let sequence = builder.build();
        assert_eq!(sequence.segment_count(), 3);
        assert_eq!(&sequence, &b"hello world!"[..]);
    }
}
