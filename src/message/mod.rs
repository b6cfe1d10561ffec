//! Message protocol contracts.
//!
//! A protocol turns buffered bytes into inbound messages and outbound messages
//! into bytes. Two flavors exist:
//!
//! - [`MessageProtocol`] - self-delimiting ("custom") protocols that find
//!   message boundaries in the raw socket stream themselves
//! - [`DelimitedMessageProtocol`] - protocols that only ever see one whole
//!   message at a time; wrap them in [`EndOfMessageDelimitedProtocol`] so the
//!   socket's own end-of-message markers delimit messages
//!
//! # Example
//!
//! ```
//! use wspipe::error::Result;
//! use wspipe::message::{DelimitedMessageProtocol, EndOfMessageDelimitedProtocol, MessageProtocol};
//! use wspipe::protocol::{build_message, BufferWriter, ByteBufferWriter, ByteSequence};
//!
//! struct Upper;
//!
//! impl DelimitedMessageProtocol for Upper {
//!     type In = String;
//!     type Out = String;
//!
//!     fn parse_message(&self, input: &mut ByteSequence) -> Result<String> {
//!         let text = String::from_utf8(input.to_vec())?;
//!         let _ = input.split_to(input.len());
//!         Ok(text.to_uppercase())
//!     }
//!
//!     fn write_message(&self, message: &String, output: &mut dyn BufferWriter) -> Result<()> {
//!         output.write(message.as_bytes());
//!         Ok(())
//!     }
//! }
//!
//! let protocol = EndOfMessageDelimitedProtocol::new(Upper);
//! let mut input = ByteSequence::from(build_message([&b"pi"[..], &b"ng"[..]]));
//! assert_eq!(protocol.try_parse_message(&mut input).unwrap().as_deref(), Some("PING"));
//! ```

mod composite;
mod delimited;

pub use composite::{compose, compose_delimited, CompositeDelimitedProtocol, CompositeProtocol};
pub use delimited::EndOfMessageDelimitedProtocol;

use std::sync::Arc;

use crate::config::TransferFormat;
use crate::error::Result;
use crate::protocol::{BufferWriter, ByteSequence};

/// A self-delimiting wire protocol.
pub trait MessageProtocol: Send + Sync + 'static {
    /// Messages read from the peer.
    type In: Send + 'static;
    /// Messages written to the peer.
    type Out: Send + Sync + 'static;

    /// Try to parse one message off the front of `input`.
    ///
    /// Returns `Ok(None)` and leaves `input` untouched when no complete
    /// message is buffered. On success `input` is advanced past the message.
    fn try_parse_message(&self, input: &mut ByteSequence) -> Result<Option<Self::In>>;

    /// Serialize one message into `output`.
    fn write_message(&self, message: &Self::Out, output: &mut dyn BufferWriter) -> Result<()>;

    /// Whether the pipes carry the length/flag frame envelope for this protocol.
    fn is_framed(&self) -> bool {
        false
    }

    /// Socket message type this protocol's output needs, if it has a
    /// preference. Used unless a transfer format is set explicitly.
    fn transfer_format(&self) -> Option<TransferFormat> {
        None
    }
}

/// A protocol that parses exactly one whole message per call.
pub trait DelimitedMessageProtocol: Send + Sync + 'static {
    /// Messages read from the peer.
    type In: Send + 'static;
    /// Messages written to the peer.
    type Out: Send + Sync + 'static;

    /// Parse `input`, which holds exactly one message.
    fn parse_message(&self, input: &mut ByteSequence) -> Result<Self::In>;

    /// Serialize one message into `output`.
    ///
    /// Each `get_buffer`/`advance` pair becomes one socket frame.
    fn write_message(&self, message: &Self::Out, output: &mut dyn BufferWriter) -> Result<()>;

    /// See [`MessageProtocol::transfer_format`].
    fn transfer_format(&self) -> Option<TransferFormat> {
        None
    }
}

/// Reading half of a self-delimiting protocol.
pub trait MessageReader: Send + Sync + 'static {
    /// Messages produced.
    type Message: Send + 'static;

    /// See [`MessageProtocol::try_parse_message`].
    fn try_parse_message(&self, input: &mut ByteSequence) -> Result<Option<Self::Message>>;
}

/// Reading half of a delimited protocol.
pub trait DelimitedMessageReader: Send + Sync + 'static {
    /// Messages produced.
    type Message: Send + 'static;

    /// See [`DelimitedMessageProtocol::parse_message`].
    fn parse_message(&self, input: &mut ByteSequence) -> Result<Self::Message>;
}

/// Writing half of any protocol.
pub trait MessageWriter: Send + Sync + 'static {
    /// Messages consumed.
    type Message: Send + Sync + 'static;

    /// Serialize one message into `output`.
    fn write_message(&self, message: &Self::Message, output: &mut dyn BufferWriter) -> Result<()>;
}

/// The writing half of a full protocol, shareable as a [`MessageWriter`].
#[derive(Debug)]
pub struct ProtocolWriter<P> {
    protocol: Arc<P>,
}

impl<P: MessageProtocol> ProtocolWriter<P> {
    /// Write messages with `protocol`.
    pub fn new(protocol: Arc<P>) -> Self {
        Self { protocol }
    }
}

impl<P: MessageProtocol> MessageWriter for ProtocolWriter<P> {
    type Message = P::Out;

    #[inline]
    fn write_message(&self, message: &P::Out, output: &mut dyn BufferWriter) -> Result<()> {
        self.protocol.write_message(message, output)
    }
}
