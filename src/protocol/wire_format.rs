//! Frame envelope encoding and decoding.
//!
//! Every frame on a pipe has the layout:
//! ```text
//! ┌──────────┬─────────────────┬───────┐
//! │ Length   │ Payload         │ Flag  │
//! │ 4 bytes  │ Length bytes    │ 1 byte│
//! │ uint32 BE│                 │ 0 / 1 │
//! └──────────┴─────────────────┴───────┘
//! ```
//!
//! The flag is `1` on the last frame of a message and `0` otherwise.

use crate::error::{Result, WsPipeError};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the trailing end-of-message flag.
pub const FLAG_SIZE: usize = 1;

/// Bytes a frame adds on top of its payload.
pub const FRAME_OVERHEAD: usize = LENGTH_PREFIX_SIZE + FLAG_SIZE;

/// Flag value for the last frame of a message.
pub const END_OF_MESSAGE: u8 = 1;

/// Flag value for every frame but the last.
pub const NOT_END_OF_MESSAGE: u8 = 0;

/// Encode a payload length as a big-endian prefix.
#[inline]
pub fn encode_length(length: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    length.to_be_bytes()
}

/// Encode a payload length into the first four bytes of `buf`.
///
/// # Panics
///
/// Panics if buffer is smaller than `LENGTH_PREFIX_SIZE` (4 bytes).
#[inline]
pub fn encode_length_into(length: u32, buf: &mut [u8]) {
    buf[..LENGTH_PREFIX_SIZE].copy_from_slice(&length.to_be_bytes());
}

/// Decode a big-endian length prefix.
#[inline]
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    u32::from_be_bytes(prefix)
}

/// Encode the end-of-message flag.
#[inline]
pub fn encode_flag(end_of_message: bool) -> u8 {
    if end_of_message {
        END_OF_MESSAGE
    } else {
        NOT_END_OF_MESSAGE
    }
}

/// Decode the end-of-message flag, rejecting anything but `0` or `1`.
pub fn decode_flag(flag: u8) -> Result<bool> {
    match flag {
        END_OF_MESSAGE => Ok(true),
        NOT_END_OF_MESSAGE => Ok(false),
        other => Err(WsPipeError::Protocol(format!(
            "Invalid end-of-message flag {other:#04x}"
        ))),
    }
}

/// Check a decoded payload length against a configured maximum.
pub fn validate_length(length: u32, max_frame_size: u32) -> Result<()> {
    if length > max_frame_size {
        return Err(WsPipeError::Protocol(format!(
            "Frame size {} exceeds maximum {}",
            length, max_frame_size
        )));
    }
    Ok(())
}

/// Total encoded size of a frame carrying `payload_len` bytes.
#[inline]
pub fn encoded_len(payload_len: usize) -> usize {
    payload_len + FRAME_OVERHEAD
}
