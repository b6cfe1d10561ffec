//! # wspipe
//!
//! Per-connection WebSocket message pipeline for tokio.
//!
//! Every connection gets two in-memory byte pipes between the socket and the
//! application, with backpressure in both directions. Socket fragments are
//! re-framed into the inbound pipe so message boundaries survive, including
//! empty messages.
//!
//! ## Architecture
//!
//! - **Transport** ([`transport`]): receive and send loops between a
//!   [`WebSocket`](transport::WebSocket) and the transport ends of the pipes,
//!   with a bounded shutdown race
//! - **Framing** ([`protocol`]): `[u32 BE length][payload][u8 end-of-message]`
//! - **Protocols** ([`message`], [`codec`]): turn buffered bytes into messages
//!   and messages into bytes
//! - **Connections** ([`connection`]): lifecycle, single-writer output,
//!   abort and ordered teardown
//! - **Dispatch** ([`dispatch`]): the parse loop and the application callbacks
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//! use wspipe::codec::TextCodec;
//! use wspipe::{ConnectionContext, DispatcherBuilder, MessageDispatcher, Result, WebSocketServer};
//!
//! struct Reverse;
//!
//! #[async_trait]
//! impl MessageDispatcher for Reverse {
//!     type In = String;
//!     type Out = String;
//!
//!     async fn dispatch_message(&self, connection: &Arc<ConnectionContext<String>>, message: String) -> Result<()> {
//!         connection.write(&message.chars().rev().collect()).await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let executor = DispatcherBuilder::new()
//!         .use_delimited_protocol(TextCodec)
//!         .use_dispatcher(Reverse)
//!         .build();
//!
//!     let listener = TcpListener::bind("127.0.0.1:9000").await?;
//!     WebSocketServer::new(executor)
//!         .serve(listener, CancellationToken::new())
//!         .await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod pipe;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::Client;
pub use connection::ConnectionContext;
pub use dispatch::{DispatcherBuilder, MessageDispatcher};
pub use error::{Result, WsPipeError};
pub use server::{Listener, WebSocketServer};
