//! JSON codec using `serde_json`.

use std::fmt;
use std::marker::PhantomData;

use bytes::Buf;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::message::DelimitedMessageProtocol;
use crate::protocol::{BufferWriter, ByteSequence};

/// JSON protocol reading `In` and writing `Out`, one document per socket
/// message. Pair it with `TransferFormat::Text`.
pub struct JsonCodec<In, Out = In> {
    _types: PhantomData<fn() -> (In, Out)>,
}

impl<In, Out> JsonCodec<In, Out> {
    /// Create the codec.
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<In, Out> Default for JsonCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> Clone for JsonCodec<In, Out> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<In, Out> fmt::Debug for JsonCodec<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<In, Out> DelimitedMessageProtocol for JsonCodec<In, Out>
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + Sync + 'static,
{
    type In = In;
    type Out = Out;

    fn parse_message(&self, input: &mut ByteSequence) -> Result<In> {
        let len = input.remaining();
        let bytes = input.copy_to_bytes(len);
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_message(&self, message: &Out, output: &mut dyn BufferWriter) -> Result<()> {
        let encoded = serde_json::to_vec(message)?;
        output.write(&encoded);
        Ok(())
    }
}
