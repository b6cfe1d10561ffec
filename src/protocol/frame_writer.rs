//! Frame writer that wraps every committed chunk in a frame envelope.
//!
//! The flag byte of a frame is deferred: it is only known once the next frame
//! starts (flag `0`) or [`FrameWriter::finish_last_frame`] is called.
//!
//! # Example
//!
//! ```
//! use wspipe::protocol::{BufferWriter, ByteBufferWriter, FrameWriter};
//!
//! let mut output = ByteBufferWriter::new();
//! let mut frames = FrameWriter::new(&mut output);
//! frames.write(&[1, 2, 3, 4, 5]);
//! frames.write(&[6, 7]);
//! frames.finish_last_frame(true);
//!
//! assert_eq!(
//!     output.written(),
//!     &[0, 0, 0, 5, 1, 2, 3, 4, 5, 0, 0, 0, 0, 2, 6, 7, 1]
//! );
//! ```

use super::buffer::BufferWriter;
use super::wire_format::{encode_flag, encode_length_into, LENGTH_PREFIX_SIZE, NOT_END_OF_MESSAGE};

/// A [`BufferWriter`] adapter that frames each `get_buffer`/`advance` pair.
pub struct FrameWriter<'a, W: BufferWriter + ?Sized> {
    inner: &'a mut W,
    /// A frame was committed whose flag byte is not written yet.
    flag_pending: bool,
    /// `get_buffer` was called for the current frame.
    buffer_requested: bool,
}

impl<'a, W: BufferWriter + ?Sized> FrameWriter<'a, W> {
    /// Wrap an inner writer.
    pub fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            flag_pending: false,
            buffer_requested: false,
        }
    }

    /// Whether at least one frame is waiting for its flag byte.
    #[inline]
    pub fn has_pending_frame(&self) -> bool {
        self.flag_pending
    }

    /// Offset of the length prefix inside the inner buffer.
    #[inline]
    fn prefix_offset(&self) -> usize {
        usize::from(self.flag_pending)
    }

    /// Write the flag of the pending frame and commit it.
    ///
    /// With no pending frame and `end_of_message` set, an empty final frame
    /// is emitted so the message is still delimited.
    pub fn finish_last_frame(&mut self, end_of_message: bool) {
        if !self.flag_pending {
            if !end_of_message {
                return;
            }
            self.emit_empty_frame();
        }

        let buf = self.inner.get_buffer(1);
        buf[0] = encode_flag(end_of_message);
        self.inner.advance(1);
        self.flag_pending = false;
    }

    fn emit_empty_frame(&mut self) {
        self.commit_frame(0);
    }

    fn commit_frame(&mut self, count: usize) {
        let offset = self.prefix_offset();
        let total = offset + LENGTH_PREFIX_SIZE + count;
        let buf = self.inner.get_buffer(total);
        if self.flag_pending {
            buf[0] = NOT_END_OF_MESSAGE;
        }
        encode_length_into(count as u32, &mut buf[offset..]);
        self.inner.advance(total);

        self.flag_pending = true;
        self.buffer_requested = false;
    }
}

impl<W: BufferWriter + ?Sized> BufferWriter for FrameWriter<'_, W> {
    /// # Panics
    ///
    /// Panics if a buffer was already requested for the current frame.
    fn get_buffer(&mut self, size_hint: usize) -> &mut [u8] {
        assert!(
            !self.buffer_requested,
            "multiple buffer requests per frame are not supported"
        );
        self.buffer_requested = true;

        let start = self.prefix_offset() + LENGTH_PREFIX_SIZE;
        let hint = if size_hint == 0 { 0 } else { start + size_hint };
        &mut self.inner.get_buffer(hint)[start..]
    }

    /// Commit the current frame with `count` payload bytes.
    ///
    /// Advancing `0` without a buffer request emits an empty frame.
    ///
    /// # Panics
    ///
    /// Panics if `count > 0` and no buffer was requested.
    fn advance(&mut self, count: usize) {
        if !self.buffer_requested {
            assert!(count == 0, "advance without a buffer request");
        }
        self.commit_frame(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::buffer::{ByteBufferWriter, MIN_BUFFER_SIZE};

    #[test]
    fn test_two_frames_then_end_of_message() {
        let mut output = ByteBufferWriter::new();
        let mut frames = FrameWriter::new(&mut output);

        let buf = frames.get_buffer(0);
        buf[..5].copy_from_slice(&[1, 2, 3, 4, 5]);
        frames.advance(5);

        let buf = frames.get_buffer(0);
        buf[..2].copy_from_slice(&[6, 7]);
        frames.advance(2);

        frames.finish_last_frame(true);

        assert_eq!(
            output.written(),
            &[0, 0, 0, 5, 1, 2, 3, 4, 5, 0, 0, 0, 0, 2, 6, 7, 1]
        );
    }

    #[test]
    fn test_flag_deferred_until_next_frame() {
        let mut output = ByteBufferWriter::new();
        {
            let mut frames = FrameWriter::new(&mut output);
            frames.write(b"Pi");
            assert!(frames.has_pending_frame());
        }
        assert_eq!(output.written(), &[0, 0, 0, 2, b'P', b'i']);
    }

    #[test]
    fn test_size_hint_respected() {
        for hint in [1usize, 5, 10, 100, 1000, 10_000] {
            let mut output = ByteBufferWriter::new();
            let mut frames = FrameWriter::new(&mut output);
            assert!(frames.get_buffer(hint).len() >= hint);
        }

        let mut output = ByteBufferWriter::new();
        let mut frames = FrameWriter::new(&mut output);
        assert!(frames.get_buffer(0).len() >= MIN_BUFFER_SIZE - LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn test_advance_zero_without_buffer_emits_empty_frame() {
        let mut output = ByteBufferWriter::new();
        let mut frames = FrameWriter::new(&mut output);
        frames.advance(0);
        frames.finish_last_frame(true);

        assert_eq!(output.written(), &[0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_finish_without_frames_emits_empty_message() {
        let mut output = ByteBufferWriter::new();
        FrameWriter::new(&mut output).finish_last_frame(true);
        assert_eq!(output.written(), &[0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_finish_not_end_of_message_without_frames_is_noop() {
        let mut output = ByteBufferWriter::new();
        FrameWriter::new(&mut output).finish_last_frame(false);
        assert!(output.is_empty());
    }

    #[test]
    fn test_empty_frame_after_data_frame() {
        let mut output = ByteBufferWriter::new();
        let mut frames = FrameWriter::new(&mut output);
        frames.write(b"a");
        frames.advance(0);
        frames.finish_last_frame(true);

        assert_eq!(output.written(), &[0, 0, 0, 1, b'a', 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    #[should_panic(expected = "multiple buffer requests")]
    fn test_second_buffer_request_panics() {
        let mut output = ByteBufferWriter::new();
        let mut frames = FrameWriter::new(&mut output);
        frames.get_buffer(1);
        frames.get_buffer(1);
    }

    #[test]
    #[should_panic(expected = "advance without a buffer request")]
    fn test_advance_without_buffer_panics() {
        let mut output = ByteBufferWriter::new();
        let mut frames = FrameWriter::new(&mut output);
        frames.advance(3);
    }
}
