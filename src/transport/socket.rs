//! Socket abstraction consumed by the transport adapter.
//!
//! A [`WebSocket`] splits into a [`SocketReceiver`] and a [`SocketSender`] so
//! the receive and send loops can run concurrently. Implementations exist for
//! `tokio-tungstenite` streams and for an in-memory pair used in tests.

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::TransferFormat;
use crate::error::Result;

/// Type of a socket data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketMessageType {
    /// UTF-8 text.
    Text,
    /// Arbitrary bytes.
    Binary,
}

impl From<TransferFormat> for SocketMessageType {
    fn from(format: TransferFormat) -> Self {
        match format {
            TransferFormat::Text => SocketMessageType::Text,
            TransferFormat::Binary => SocketMessageType::Binary,
        }
    }
}

/// Status sent with a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    /// Normal closure (1000).
    Normal,
    /// The endpoint hit an internal error (1011).
    InternalError,
}

impl CloseStatus {
    /// Numeric close code.
    pub fn code(self) -> u16 {
        match self {
            CloseStatus::Normal => 1000,
            CloseStatus::InternalError => 1011,
        }
    }
}

/// Something received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A data fragment.
    Data {
        /// Fragment bytes; may be empty.
        payload: Bytes,
        /// Text or binary.
        message_type: SocketMessageType,
        /// Whether this fragment ends its message.
        end_of_message: bool,
    },
    /// The peer started or completed the close handshake.
    Close {
        /// Close code sent by the peer, if any.
        code: Option<u16>,
    },
    /// The peer pinged us.
    Ping,
    /// The peer answered a ping.
    Pong,
}

/// Receiving half of a socket.
#[async_trait]
pub trait SocketReceiver: Send + 'static {
    /// Wait for the next event.
    ///
    /// A stream that ends without a close frame yields
    /// `Err(WsPipeError::ConnectionClosed)`.
    async fn receive(&mut self) -> Result<SocketEvent>;
}

/// Sending half of a socket.
#[async_trait]
pub trait SocketSender: Send + 'static {
    /// Send one fragment.
    async fn send(
        &mut self,
        payload: Bytes,
        message_type: SocketMessageType,
        end_of_message: bool,
    ) -> Result<()>;

    /// Send a close frame.
    async fn close(&mut self, status: CloseStatus) -> Result<()>;

    /// Send a keep-alive ping.
    async fn ping(&mut self) -> Result<()>;

    /// Check if the socket still accepts data (not closed, aborted or
    /// close-sent).
    fn can_send(&self) -> bool;
}

/// A connected WebSocket that can be split for concurrent use.
pub trait WebSocket: Send + 'static {
    /// Receiving half.
    type Receiver: SocketReceiver;
    /// Sending half.
    type Sender: SocketSender;

    /// Split into receiving and sending halves.
    fn split(self) -> (Self::Receiver, Self::Sender);
}
