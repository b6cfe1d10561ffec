//! Codec module - ready-made message protocols.
//!
//! - [`RawCodec`] - Pass-through for binary messages (zero-copy where possible)
//! - [`TextCodec`] - UTF-8 strings, one per socket message
//! - [`NullTerminatedTextProtocol`] - UTF-8 strings ending in a NUL byte (self-delimiting)
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (to_vec_named for struct-as-map)
//! - [`JsonCodec`] - JSON using `serde_json`
//!
//! # Design
//!
//! Delimited codecs implement [`DelimitedMessageProtocol`](crate::message::DelimitedMessageProtocol)
//! and are turned into framed protocols by
//! [`DispatcherBuilder::use_delimited_protocol`](crate::dispatch::DispatcherBuilder::use_delimited_protocol).
//! Codecs carry their message types as type parameters so protocol selection
//! is resolved at compile time per connection type.
//!
//! # Example
//!
//! ```
//! use wspipe::codec::msgpack;
//!
//! let encoded = msgpack::encode(&"hello").unwrap();
//! let decoded: String = msgpack::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod json;
pub mod msgpack;
mod raw;
mod text;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;
pub use text::{NullTerminatedTextProtocol, TextCodec, NUL};
