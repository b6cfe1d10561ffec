//! Delimited protocols carried over the frame envelope.
//!
//! Outbound, every frame the inner protocol writes is enveloped and the last
//! one is flagged as end of message. Inbound, frames are collected until the
//! end-of-message flag and the concatenated payload is handed to the inner
//! protocol as one message.

use tracing::trace;

use super::{DelimitedMessageProtocol, MessageProtocol};
use crate::config::TransferFormat;
use crate::error::Result;
use crate::protocol::{BufferWriter, ByteSequence, FrameReader, FrameWriter, SequenceBuilder};

/// Adapts a [`DelimitedMessageProtocol`] to the framed pipe stream.
#[derive(Debug, Clone)]
pub struct EndOfMessageDelimitedProtocol<D> {
    inner: D,
    reader: FrameReader,
}

impl<D: DelimitedMessageProtocol> EndOfMessageDelimitedProtocol<D> {
    /// Wrap `inner` with the default maximum frame size.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            reader: FrameReader::new(),
        }
    }

    /// Wrap `inner`, rejecting frames larger than `max_frame_size`.
    pub fn with_max_frame_size(inner: D, max_frame_size: u32) -> Self {
        Self {
            inner,
            reader: FrameReader::with_max_frame_size(max_frame_size),
        }
    }

    /// The wrapped protocol.
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: DelimitedMessageProtocol> MessageProtocol for EndOfMessageDelimitedProtocol<D> {
    type In = D::In;
    type Out = D::Out;

    fn try_parse_message(&self, input: &mut ByteSequence) -> Result<Option<Self::In>> {
        let mut cursor = input.clone();
        let mut message = SequenceBuilder::new();

        while let Some(frame) = self.reader.read_frame(&mut cursor)? {
            message.append(frame.payload);
            if frame.end_of_message {
                // The message is consumed even if the inner parse fails.
                *input = cursor;
                let mut message = message.build();
                trace!(len = message.len(), "Parsing delimited message");
                return self.inner.parse_message(&mut message).map(Some);
            }
        }

        Ok(None)
    }

    fn write_message(&self, message: &Self::Out, output: &mut dyn BufferWriter) -> Result<()> {
        let mut frames = FrameWriter::new(output);
        self.inner.write_message(message, &mut frames)?;
        frames.finish_last_frame(true);
        Ok(())
    }

    fn is_framed(&self) -> bool {
        true
    }

    fn transfer_format(&self) -> Option<TransferFormat> {
        self.inner.transfer_format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WsPipeError;
    use crate::protocol::{build_frame, build_message, ByteBufferWriter};

    /// Reads UTF-8 text; writes one frame per `|`-separated chunk.
    struct Chunked;

    impl DelimitedMessageProtocol for Chunked {
        type In = String;
        type Out = String;

        fn parse_message(&self, input: &mut ByteSequence) -> Result<String> {
            if input.position(b'!').is_some() {
                return Err(WsPipeError::Parse("bang".to_string()));
            }
            let text = String::from_utf8(input.to_vec())?;
            let _ = input.split_to(input.len());
            Ok(text)
        }

        fn write_message(&self, message: &String, output: &mut dyn BufferWriter) -> Result<()> {
            for chunk in message.split('|').filter(|c| !c.is_empty()) {
                output.write(chunk.as_bytes());
            }
            Ok(())
        }
    }

    #[test]
    fn test_fragments_reassembled() {
        let protocol = EndOfMessageDelimitedProtocol::new(Chunked);
        let mut input = ByteSequence::from(build_message([&b"Pi"[..], &b"ng"[..]]));

        let message = protocol.try_parse_message(&mut input).unwrap();
        assert_eq!(message.as_deref(), Some("Ping"));
        assert!(input.is_empty());
    }

    #[test]
    fn test_incomplete_message_leaves_input() {
        let protocol = EndOfMessageDelimitedProtocol::new(Chunked);
        let bytes = build_frame(b"Pi", false);
        let mut input = ByteSequence::from(bytes.clone());

        assert!(protocol.try_parse_message(&mut input).unwrap().is_none());
        assert_eq!(input.to_vec(), bytes);
    }

    #[test]
    fn test_two_empty_messages_stay_distinct() {
        let protocol = EndOfMessageDelimitedProtocol::new(Chunked);
        let mut bytes = build_frame(b"", true);
        bytes.extend_from_slice(&build_frame(b"", true));
        let mut input = ByteSequence::from(bytes);

        assert_eq!(protocol.try_parse_message(&mut input).unwrap().as_deref(), Some(""));
        assert_eq!(protocol.try_parse_message(&mut input).unwrap().as_deref(), Some(""));
        assert!(protocol.try_parse_message(&mut input).unwrap().is_none());
    }

    #[test]
    fn test_parse_error_consumes_message() {
        let protocol = EndOfMessageDelimitedProtocol::new(Chunked);
        let mut bytes = build_frame(b"bad!", true);
        bytes.extend_from_slice(&build_frame(b"ok", true));
        let mut input = ByteSequence::from(bytes);

        let err = protocol.try_parse_message(&mut input).unwrap_err();
        assert!(!err.is_framing_error());
        assert_eq!(protocol.try_parse_message(&mut input).unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_oversized_frame_is_framing_error() {
        let protocol = EndOfMessageDelimitedProtocol::with_max_frame_size(Chunked, 2);
        let mut input = ByteSequence::from(build_frame(b"long", true));

        let err = protocol.try_parse_message(&mut input).unwrap_err();
        assert!(err.is_framing_error());
    }

    #[test]
    fn test_write_frames_every_chunk() {
        let protocol = EndOfMessageDelimitedProtocol::new(Chunked);
        let mut output = ByteBufferWriter::new();
        protocol
            .write_message(&"Pi|ng".to_string(), &mut output)
            .unwrap();

        assert_eq!(
            output.written(),
            build_message([&b"Pi"[..], &b"ng"[..]]).as_slice()
        );
        assert!(protocol.is_framed());
    }

    #[test]
    fn test_write_empty_message() {
        let protocol = EndOfMessageDelimitedProtocol::new(Chunked);
        let mut output = ByteBufferWriter::new();
        protocol.write_message(&String::new(), &mut output).unwrap();

        assert_eq!(output.written(), &[0, 0, 0, 0, 1]);
    }
}
