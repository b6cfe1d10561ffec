//! Raw codec - pass-through for binary messages.
//!
//! Used when payloads are already serialized or are opaque bytes.
//! Inbound messages are zero-copy whenever the message arrived in a single
//! pipe segment.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use wspipe::codec::RawCodec;
//! use wspipe::message::DelimitedMessageProtocol;
//! use wspipe::protocol::{ByteBufferWriter, ByteSequence};
//!
//! let codec = RawCodec::new();
//! let mut output = ByteBufferWriter::new();
//! codec.write_message(&Bytes::from_static(b"binary"), &mut output).unwrap();
//! assert_eq!(output.written(), b"binary");
//!
//! let mut input = ByteSequence::from(Bytes::from_static(b"binary"));
//! assert_eq!(codec.parse_message(&mut input).unwrap(), Bytes::from_static(b"binary"));
//! ```

use bytes::{Buf, Bytes};

use crate::config::TransferFormat;
use crate::error::Result;
use crate::message::DelimitedMessageProtocol;
use crate::protocol::{BufferWriter, ByteSequence};

/// Raw codec that passes bytes through without transformation.
///
/// With a chunk size set, outbound messages are split into several socket
/// frames of at most that many bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec {
    chunk_size: Option<usize>,
}

impl RawCodec {
    /// Send every message as a single frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Split outbound messages into frames of at most `chunk_size` bytes.
    ///
    /// A `chunk_size` of `0` is treated as "no splitting".
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: (chunk_size > 0).then_some(chunk_size),
        }
    }

    /// Configured frame size limit, if any.
    #[inline]
    pub fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }
}

impl DelimitedMessageProtocol for RawCodec {
    type In = Bytes;
    type Out = Bytes;

    fn parse_message(&self, input: &mut ByteSequence) -> Result<Bytes> {
        let len = input.remaining();
        Ok(input.copy_to_bytes(len))
    }

    fn write_message(&self, message: &Bytes, output: &mut dyn BufferWriter) -> Result<()> {
        match self.chunk_size {
            Some(size) => {
                for chunk in message.chunks(size) {
                    output.write(chunk);
                }
            }
            None => output.write(message),
        }
        Ok(())
    }

    fn transfer_format(&self) -> Option<TransferFormat> {
        Some(TransferFormat::Binary)
    }
}
