//! Protocols assembled from independent reader and writer halves.

use super::{
    DelimitedMessageProtocol, DelimitedMessageReader, MessageProtocol, MessageReader,
    MessageWriter,
};
use crate::error::Result;
use crate::protocol::{BufferWriter, ByteSequence};

/// A self-delimiting protocol built by [`compose`].
#[derive(Debug, Clone)]
pub struct CompositeProtocol<R, W> {
    reader: R,
    writer: W,
}

/// A delimited protocol built by [`compose_delimited`].
#[derive(Debug, Clone)]
pub struct CompositeDelimitedProtocol<R, W> {
    reader: R,
    writer: W,
}

/// Combine a self-delimiting reader with a writer.
pub fn compose<R, W>(reader: R, writer: W) -> CompositeProtocol<R, W>
where
    R: MessageReader,
    W: MessageWriter,
{
    CompositeProtocol { reader, writer }
}

/// Combine a whole-message reader with a writer.
pub fn compose_delimited<R, W>(reader: R, writer: W) -> CompositeDelimitedProtocol<R, W>
where
    R: DelimitedMessageReader,
    W: MessageWriter,
{
    CompositeDelimitedProtocol { reader, writer }
}

impl<R: MessageReader, W: MessageWriter> MessageProtocol for CompositeProtocol<R, W> {
    type In = R::Message;
    type Out = W::Message;

    #[inline]
    fn try_parse_message(&self, input: &mut ByteSequence) -> Result<Option<Self::In>> {
        self.reader.try_parse_message(input)
    }

    #[inline]
    fn write_message(&self, message: &Self::Out, output: &mut dyn BufferWriter) -> Result<()> {
        self.writer.write_message(message, output)
    }
}

impl<R: DelimitedMessageReader, W: MessageWriter> DelimitedMessageProtocol
    for CompositeDelimitedProtocol<R, W>
{
    type In = R::Message;
    type Out = W::Message;

    #[inline]
    fn parse_message(&self, input: &mut ByteSequence) -> Result<Self::In> {
        self.reader.parse_message(input)
    }

    #[inline]
    fn write_message(&self, message: &Self::Out, output: &mut dyn BufferWriter) -> Result<()> {
        self.writer.write_message(message, output)
    }
}
