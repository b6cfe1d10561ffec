//! In-memory socket pair.
//!
//! Both ends are symmetric: whatever one end sends the other receives, one
//! [`SocketEvent`] per `send`, so fragment boundaries and end-of-message
//! flags are preserved exactly. Channels are bounded; a peer that stops
//! receiving eventually blocks the other end's sends.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use wspipe::transport::{memory_socket_pair, SocketEvent, SocketMessageType, SocketReceiver, SocketSender, WebSocket};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let (client, server) = memory_socket_pair();
//! let (_client_rx, mut client_tx) = client.split();
//! let (mut server_rx, _server_tx) = server.split();
//!
//! client_tx.send(Bytes::from_static(b"Pi"), SocketMessageType::Text, false).await.unwrap();
//! let event = server_rx.receive().await.unwrap();
//! assert_eq!(event, SocketEvent::Data {
//!     payload: Bytes::from_static(b"Pi"),
//!     message_type: SocketMessageType::Text,
//!     end_of_message: false,
//! });
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::socket::{
    CloseStatus, SocketEvent, SocketMessageType, SocketReceiver, SocketSender, WebSocket,
};
use crate::error::{Result, WsPipeError};

/// Default number of events buffered per direction.
pub const DEFAULT_MEMORY_SOCKET_CAPACITY: usize = 64;

/// Create a connected pair of in-memory sockets.
pub fn memory_socket_pair() -> (MemorySocket, MemorySocket) {
    memory_socket_pair_with_capacity(DEFAULT_MEMORY_SOCKET_CAPACITY)
}

/// Create a connected pair buffering at most `capacity` events per direction.
pub fn memory_socket_pair_with_capacity(capacity: usize) -> (MemorySocket, MemorySocket) {
    let (a_tx, a_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, b_rx) = mpsc::channel(capacity.max(1));

    (
        MemorySocket { tx: a_tx, rx: b_rx },
        MemorySocket { tx: b_tx, rx: a_rx },
    )
}

/// One end of an in-memory socket pair.
#[derive(Debug)]
pub struct MemorySocket {
    tx: mpsc::Sender<SocketEvent>,
    rx: mpsc::Receiver<SocketEvent>,
}

impl WebSocket for MemorySocket {
    type Receiver = MemoryReceiver;
    type Sender = MemorySender;

    fn split(self) -> (MemoryReceiver, MemorySender) {
        (
            MemoryReceiver { rx: self.rx },
            MemorySender {
                tx: self.tx,
                close_sent: false,
            },
        )
    }
}

/// Receiving half of a [`MemorySocket`].
#[derive(Debug)]
pub struct MemoryReceiver {
    rx: mpsc::Receiver<SocketEvent>,
}

#[async_trait]
impl SocketReceiver for MemoryReceiver {
    async fn receive(&mut self) -> Result<SocketEvent> {
        self.rx.recv().await.ok_or(WsPipeError::ConnectionClosed)
    }
}

/// Sending half of a [`MemorySocket`].
#[derive(Debug)]
pub struct MemorySender {
    tx: mpsc::Sender<SocketEvent>,
    close_sent: bool,
}

impl MemorySender {
    async fn send_event(&mut self, event: SocketEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| WsPipeError::ConnectionClosed)
    }

    /// Send a whole message in one fragment.
    pub async fn send_message(
        &mut self,
        payload: impl Into<Bytes>,
        message_type: SocketMessageType,
    ) -> Result<()> {
        self.send(payload.into(), message_type, true).await
    }

    /// Answer a ping.
    pub async fn pong(&mut self) -> Result<()> {
        self.send_event(SocketEvent::Pong).await
    }
}

#[async_trait]
impl SocketSender for MemorySender {
    async fn send(
        &mut self,
        payload: Bytes,
        message_type: SocketMessageType,
        end_of_message: bool,
    ) -> Result<()> {
        self.send_event(SocketEvent::Data {
            payload,
            message_type,
            end_of_message,
        })
        .await
    }

    async fn close(&mut self, status: CloseStatus) -> Result<()> {
        self.close_sent = true;
        self.send_event(SocketEvent::Close {
            code: Some(status.code()),
        })
        .await
    }

    async fn ping(&mut self) -> Result<()> {
        self.send_event(SocketEvent::Ping).await
    }

    fn can_send(&self) -> bool {
        !self.close_sent && !self.tx.is_closed()
    }
}
