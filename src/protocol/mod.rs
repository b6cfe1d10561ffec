//! Protocol module - byte sequences, buffer writers and the frame codec.
//!
//! This module implements the framing used when messages are delimited by
//! socket end-of-message markers:
//! - 4-byte big-endian length prefix plus a trailing end-of-message flag
//! - Frame writer with a deferred flag byte
//! - Stateless frame reader over multi-segment input

mod buffer;
mod frame;
mod frame_reader;
mod frame_writer;
mod sequence;
mod wire_format;

pub use buffer::{BufferWriter, ByteBufferWriter, MIN_BUFFER_SIZE};
pub(crate) use buffer::Scratch;
pub use frame::{build_frame, build_message, Frame};
pub use frame_reader::FrameReader;
pub use frame_writer::FrameWriter;
pub use sequence::{ByteSequence, SequenceBuilder};
pub use wire_format::{
    decode_flag, decode_length, encode_flag, encode_length, encode_length_into, encoded_len,
    validate_length, END_OF_MESSAGE, FLAG_SIZE, FRAME_OVERHEAD, LENGTH_PREFIX_SIZE,
    NOT_END_OF_MESSAGE,
};
