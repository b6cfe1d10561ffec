//! MessagePack protocol over `rmp-serde`, one value per socket message.
//!
//! Structs are written with `to_vec_named`, so they travel as maps keyed by
//! field name rather than positional arrays. Peers decoding into their own
//! record types rely on this.
//!
//! The output is not UTF-8, so a builder using this codec sends binary
//! socket messages unless a transfer format is set explicitly. Forcing
//! `TransferFormat::Text` makes `tokio-tungstenite` sends fail.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use wspipe::codec::MsgPackCodec;
//! use wspipe::message::DelimitedMessageProtocol;
//! use wspipe::protocol::{ByteBufferWriter, ByteSequence};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let codec = MsgPackCodec::<Message, Message>::new();
//! let msg = Message { id: 42, content: "hello".to_string() };
//!
//! let mut output = ByteBufferWriter::new();
//! codec.write_message(&msg, &mut output).unwrap();
//!
//! let mut input = ByteSequence::from(output.take());
//! assert_eq!(codec.parse_message(&mut input).unwrap(), msg);
//! ```

use std::fmt;
use std::marker::PhantomData;

use bytes::Buf;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::TransferFormat;
use crate::error::Result;
use crate::message::DelimitedMessageProtocol;
use crate::protocol::{BufferWriter, ByteSequence};

/// Encode `value` with structs as maps.
#[inline]
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decode one value from `bytes`.
#[inline]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// MessagePack protocol reading `In` and writing `Out`, one value per
/// socket message.
pub struct MsgPackCodec<In, Out = In> {
    _types: PhantomData<fn() -> (In, Out)>,
}

impl<In, Out> MsgPackCodec<In, Out> {
    /// Create the codec.
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<In, Out> Default for MsgPackCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> Clone for MsgPackCodec<In, Out> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<In, Out> fmt::Debug for MsgPackCodec<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MsgPackCodec")
    }
}

impl<In, Out> DelimitedMessageProtocol for MsgPackCodec<In, Out>
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + Sync + 'static,
{
    type In = In;
    type Out = Out;

    fn parse_message(&self, input: &mut ByteSequence) -> Result<In> {
        let len = input.remaining();
        let bytes = input.copy_to_bytes(len);
        decode(&bytes)
    }

    fn write_message(&self, message: &Out, output: &mut dyn BufferWriter) -> Result<()> {
        let encoded = encode(message)?;
        output.write(&encoded);
        Ok(())
    }

    /// MessagePack is not UTF-8; text frames would reject it.
    fn transfer_format(&self) -> Option<TransferFormat> {
        Some(TransferFormat::Binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    use crate::error::WsPipeError;
    use crate::protocol::ByteBufferWriter;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Telemetry {
        sensor: String,
        reading: f64,
        alarm: Option<u8>,
    }

    fn telemetry() -> Telemetry {
        Telemetry {
            sensor: "boiler-2".to_string(),
            reading: 81.5,
            alarm: None,
        }
    }

    #[test]
    fn test_structs_are_written_as_maps() {
        let encoded = encode(&telemetry()).unwrap();
        // fixmap with three entries
        assert_eq!(encoded[0], 0x83);

        let decoded: Telemetry = decode(&encoded).unwrap();
        assert_eq!(decoded, telemetry());
    }

    #[test]
    fn test_empty_message_is_a_decode_error() {
        let codec = MsgPackCodec::<Telemetry>::new();
        let mut input = ByteSequence::new();
        assert!(codec.parse_message(&mut input).is_err());
    }

    #[test]
    fn test_protocol_round_trip_across_segments() {
        let codec = MsgPackCodec::<Telemetry>::new();
        let value = telemetry();

        let mut output = ByteBufferWriter::new();
        codec.write_message(&value, &mut output).unwrap();
        let bytes = output.take();

        let mut input = ByteSequence::from(bytes.slice(..3));
        input.push(bytes.slice(3..));
        assert_eq!(codec.parse_message(&mut input).unwrap(), value);
        assert!(input.is_empty());
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let codec = MsgPackCodec::<Telemetry>::new();
        let mut input = ByteSequence::from(&b"not valid msgpack"[..]);

        let err = codec.parse_message(&mut input).unwrap_err();
        assert!(matches!(err, WsPipeError::MsgPackDecode(_)));
        assert!(!err.is_framing_error());
    }
}
