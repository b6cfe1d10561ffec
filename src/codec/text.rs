//! UTF-8 text codecs.
//!
//! - [`TextCodec`] - delimited; one socket message is one string
//! - [`NullTerminatedTextProtocol`] - self-delimiting; strings end with a NUL byte
//!
//! # Example
//!
//! ```
//! use wspipe::codec::NullTerminatedTextProtocol;
//! use wspipe::message::MessageProtocol;
//! use wspipe::protocol::ByteSequence;
//!
//! let protocol = NullTerminatedTextProtocol;
//! let mut input = ByteSequence::from(&b"ping\0pong\0po"[..]);
//!
//! assert_eq!(protocol.try_parse_message(&mut input).unwrap().as_deref(), Some("ping"));
//! assert_eq!(protocol.try_parse_message(&mut input).unwrap().as_deref(), Some("pong"));
//! assert_eq!(protocol.try_parse_message(&mut input).unwrap(), None);
//! assert_eq!(input.len(), 2);
//! ```

use bytes::Buf;

use crate::error::Result;
use crate::message::{DelimitedMessageProtocol, MessageProtocol};
use crate::protocol::{BufferWriter, ByteSequence};

/// Terminator used by [`NullTerminatedTextProtocol`].
pub const NUL: u8 = 0;

/// Text messages delimited by socket end-of-message markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl DelimitedMessageProtocol for TextCodec {
    type In = String;
    type Out = String;

    fn parse_message(&self, input: &mut ByteSequence) -> Result<String> {
        let len = input.remaining();
        let bytes = input.copy_to_bytes(len);
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    fn write_message(&self, message: &String, output: &mut dyn BufferWriter) -> Result<()> {
        output.write(message.as_bytes());
        Ok(())
    }
}

/// Text messages terminated by a NUL byte, independent of socket framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTerminatedTextProtocol;

impl MessageProtocol for NullTerminatedTextProtocol {
    type In = String;
    type Out = String;

    fn try_parse_message(&self, input: &mut ByteSequence) -> Result<Option<String>> {
        let Some(end) = input.position(NUL) else {
            return Ok(None);
        };

        let text = input.split_to(end);
        input.advance(1);
        Ok(Some(String::from_utf8(text.to_vec())?))
    }

    fn write_message(&self, message: &String, output: &mut dyn BufferWriter) -> Result<()> {
        let len = message.len() + 1;
        let buf = output.get_buffer(len);
        buf[..message.len()].copy_from_slice(message.as_bytes());
        buf[message.len()] = NUL;
        output.advance(len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::WsPipeError;
    use crate::protocol::ByteBufferWriter;

    #[test]
    fn test_text_codec_parses_whole_input() {
        let mut input = ByteSequence::from(&b"Pi"[..]);
        input.push(Bytes::from_static(b"ng"));

        assert_eq!(TextCodec.parse_message(&mut input).unwrap(), "Ping");
        assert!(input.is_empty());
    }

    #[test]
    fn test_text_codec_rejects_invalid_utf8() {
        let mut input = ByteSequence::from(vec![0xFF, 0xFE]);
        let err = TextCodec.parse_message(&mut input).unwrap_err();
        assert!(matches!(err, WsPipeError::InvalidUtf8(_)));
    }

    #[test]
    fn test_null_terminated_write() {
        let mut output = ByteBufferWriter::new();
        NullTerminatedTextProtocol
            .write_message(&"gniP".to_string(), &mut output)
            .unwrap();
        assert_eq!(output.written(), b"gniP\0");
    }

    #[test]
    fn test_null_terminated_across_segments() {
        let mut input = ByteSequence::from(&b"Pi"[..]);
        input.push(Bytes::from_static(b"ng\0"));

        let parsed = NullTerminatedTextProtocol
            .try_parse_message(&mut input)
            .unwrap();
        assert_eq!(parsed.as_deref(), Some("Ping"));
        assert!(input.is_empty());
    }

    #[test]
    fn test_null_terminated_empty_message() {
        let mut input = ByteSequence::from(&b"\0"[..]);
        let parsed = NullTerminatedTextProtocol
            .try_parse_message(&mut input)
            .unwrap();
        assert_eq!(parsed.as_deref(), Some(""));
    }

    #[test]
    fn test_null_terminated_is_not_framed() {
        assert!(!NullTerminatedTextProtocol.is_framed());
    }
}
