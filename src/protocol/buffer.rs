//! Buffer writer abstraction shared by protocols, frame writers and pipes.
//!
//! Writers hand out scratch memory with [`BufferWriter::get_buffer`] and commit
//! a prefix of it with [`BufferWriter::advance`]. Nothing is visible to a
//! consumer until it is committed.

use bytes::{Bytes, BytesMut};

/// Scratch size handed out when a caller passes a size hint of `0`.
pub const MIN_BUFFER_SIZE: usize = 4096;

/// A sink of bytes written in place.
///
/// Implementations must keep the contents of the uncommitted region intact
/// across repeated `get_buffer` calls until the next `advance`; the frame
/// writer relies on this to backfill length prefixes.
pub trait BufferWriter: Send {
    /// Get writable memory of at least `size_hint` bytes (at least
    /// [`MIN_BUFFER_SIZE`] when the hint is `0`).
    fn get_buffer(&mut self, size_hint: usize) -> &mut [u8];

    /// Commit the first `count` bytes of the last returned buffer.
    fn advance(&mut self, count: usize);

    /// Copy `data` into a fresh buffer and commit it in one step.
    fn write(&mut self, data: &[u8]) {
        let buf = self.get_buffer(data.len());
        buf[..data.len()].copy_from_slice(data);
        self.advance(data.len());
    }
}

impl<W: BufferWriter + ?Sized> BufferWriter for &mut W {
    #[inline]
    fn get_buffer(&mut self, size_hint: usize) -> &mut [u8] {
        (**self).get_buffer(size_hint)
    }

    #[inline]
    fn advance(&mut self, count: usize) {
        (**self).advance(count)
    }
}

/// Scratch management shared by the `BytesMut`-backed writers.
///
/// Committed bytes live in `buf[..committed]`; everything after is scratch.
#[derive(Debug, Default)]
pub(crate) struct Scratch {
    buf: BytesMut,
    committed: usize,
}

impl Scratch {
    pub(crate) fn get_buffer(&mut self, size_hint: usize) -> &mut [u8] {
        let want = if size_hint == 0 {
            MIN_BUFFER_SIZE
        } else {
            size_hint
        };
        let required = self.committed + want;
        if self.buf.len() < required {
            self.buf.resize(required, 0);
        }
        &mut self.buf[self.committed..]
    }

    pub(crate) fn advance(&mut self, count: usize) {
        assert!(
            self.committed + count <= self.buf.len(),
            "advanced past the end of the requested buffer"
        );
        self.committed += count;
    }

    #[inline]
    pub(crate) fn committed(&self) -> usize {
        self.committed
    }

    #[inline]
    pub(crate) fn written(&self) -> &[u8] {
        &self.buf[..self.committed]
    }

    /// Take everything committed so far, dropping any scratch.
    pub(crate) fn take(&mut self) -> Bytes {
        let out = self.buf.split_to(self.committed).freeze();
        self.buf.clear();
        self.committed = 0;
        out
    }
}

/// An in-memory [`BufferWriter`] backed by `BytesMut`.
///
/// # Example
///
/// ```
/// use wspipe::protocol::{BufferWriter, ByteBufferWriter};
///
/// let mut writer = ByteBufferWriter::new();
/// writer.write(b"abc");
/// assert_eq!(writer.written(), b"abc");
/// ```
#[derive(Debug, Default)]
pub struct ByteBufferWriter {
    scratch: Scratch,
}

impl ByteBufferWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed bytes.
    #[inline]
    pub fn written(&self) -> &[u8] {
        self.scratch.written()
    }

    /// Number of committed bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.scratch.committed()
    }

    /// Check if nothing has been committed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scratch.committed() == 0
    }

    /// Take the committed bytes, leaving the writer empty.
    pub fn take(&mut self) -> Bytes {
        self.scratch.take()
    }
}

impl BufferWriter for ByteBufferWriter {
    fn get_buffer(&mut self, size_hint: usize) -> &mut [u8] {
        self.scratch.get_buffer(size_hint)
    }

    fn advance(&mut self, count: usize) {
        self.scratch.advance(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_hint_respected() {
        let mut writer = ByteBufferWriter::new();
        for hint in [1usize, 5, 10, 100, 10_000] {
            assert!(writer.get_buffer(hint).len() >= hint);
        }
        assert!(writer.get_buffer(0).len() >= MIN_BUFFER_SIZE);
    }

    #[test]
    fn test_uncommitted_contents_survive_regrow() {
        let mut writer = ByteBufferWriter::new();
        writer.get_buffer(4)[..4].copy_from_slice(b"keep");

        let grown = writer.get_buffer(20_000);
        assert_eq!(&grown[..4], b"keep");

        writer.advance(4);
        assert_eq!(writer.written(), b"keep");
    }

    #[test]
    fn test_nothing_visible_before_advance() {
        let mut writer = ByteBufferWriter::new();
        writer.get_buffer(3)[..3].copy_from_slice(b"xyz");
        assert!(writer.is_empty());
        writer.advance(2);
        assert_eq!(writer.written(), b"xy");
    }

    #[test]
    fn test_take_resets() {
        let mut writer = ByteBufferWriter::new();
        writer.write(b"one");
        writer.get_buffer(10);
        assert_eq!(writer.take(), Bytes::from_static(b"one"));
        assert!(writer.is_empty());

        writer.write(b"two");
        assert_eq!(writer.written(), b"two");
    }

    #[test]
    #[should_panic(expected = "advanced past the end")]
    fn test_advance_past_buffer_panics() {
        let mut writer = ByteBufferWriter::new();
        writer.advance(1);
    }
}
