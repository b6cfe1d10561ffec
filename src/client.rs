//! WebSocket client runtime.
//!
//! A [`Client`] runs one outbound connection through the same pipeline the
//! server uses. The lifecycle:
//! 1. Connect (or adopt an already connected socket)
//! 2. Start the transport and dispatch tasks
//! 3. Dispatch inbound messages, write outbound ones through the context
//! 4. Dispose when either side ends
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use wspipe::codec::TextCodec;
//! use wspipe::connection::ConnectionContext;
//! use wspipe::dispatch::{DispatcherBuilder, MessageDispatcher};
//! use wspipe::error::Result;
//! use wspipe::Client;
//!
//! struct Print;
//!
//! #[async_trait]
//! impl MessageDispatcher for Print {
//!     type In = String;
//!     type Out = String;
//!
//!     async fn dispatch_message(&self, _: &Arc<ConnectionContext<String>>, message: String) -> Result<()> {
//!         println!("{message}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let executor = DispatcherBuilder::new()
//!         .use_delimited_protocol(TextCodec)
//!         .use_dispatcher(Print)
//!         .build();
//!
//!     let client = Client::connect(executor, "ws://127.0.0.1:9000").await?;
//!     client.write(&"hello".to_string()).await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::{ConnectionContext, User, WebSocketConnection};
use crate::dispatch::{ConnectionExecutor, MessageDispatcher};
use crate::error::Result;
use crate::message::MessageProtocol;
use crate::transport::{TungsteniteSocket, WebSocket};

/// One running client connection.
///
/// Dropping the client does not stop the connection; use
/// [`close`](Client::close) or [`abort`](Client::abort).
pub struct Client<P: MessageProtocol, D> {
    executor: ConnectionExecutor<P, D>,
    connection: Arc<WebSocketConnection<P::Out>>,
    finished: CancellationToken,
}

impl<P, D> Client<P, D>
where
    P: MessageProtocol,
    D: MessageDispatcher<In = P::In, Out = P::Out>,
{
    /// Connect to `request` and start the connection.
    pub async fn connect<R>(executor: ConnectionExecutor<P, D>, request: R) -> Result<Self>
    where
        R: IntoClientRequest + Unpin,
    {
        let (socket, response) = connect_async(request).await?;
        debug!(status = %response.status(), "Connected");
        Ok(Self::start(executor, TungsteniteSocket::new(socket)))
    }

    /// Start the connection over an already connected `socket`.
    pub fn start<W: WebSocket>(executor: ConnectionExecutor<P, D>, socket: W) -> Self {
        Self::start_with_user(executor, socket, None)
    }

    /// Like [`start`](Self::start), attaching `user` to the connection.
    pub fn start_with_user<W: WebSocket>(
        executor: ConnectionExecutor<P, D>,
        socket: W,
        user: Option<User>,
    ) -> Self {
        let connection = executor.start(socket, user);
        let finished = CancellationToken::new();

        tokio::spawn({
            let executor = executor.clone();
            let connection = connection.clone();
            let finished = finished.clone().drop_guard();
            async move {
                executor.finish(&connection).await;
                drop(finished);
            }
        });

        Self {
            executor,
            connection,
            finished,
        }
    }

    /// Get the connection id.
    #[inline]
    pub fn id(&self) -> &str {
        self.connection.id()
    }

    /// Get the connection context.
    #[inline]
    pub fn context(&self) -> &Arc<ConnectionContext<P::Out>> {
        self.connection.context()
    }

    /// Get the executor running this client.
    #[inline]
    pub fn executor(&self) -> &ConnectionExecutor<P, D> {
        &self.executor
    }

    /// Write one message to the server.
    pub async fn write(&self, message: &P::Out) -> Result<()> {
        self.connection.context().write(message).await
    }

    /// Stop the connection without waiting.
    pub fn abort(&self) {
        self.connection.abort();
    }

    /// Stop the connection, sending a close frame, and wait until it is
    /// disposed.
    pub async fn close(&self) {
        self.connection.abort();
        self.wait_for_shutdown().await;
    }

    /// Whether the connection was disposed.
    pub fn is_closed(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Wait until the connection was disposed, by either side.
    pub async fn wait_for_shutdown(&self) {
        self.finished.cancelled().await;
    }
}

impl<P: MessageProtocol, D> fmt::Debug for Client<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.connection.id())
            .field("closed", &self.finished.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::codec::TextCodec;
    use crate::dispatch::DispatcherBuilder;
    use crate::transport::{
        memory_socket_pair, CloseStatus, SocketEvent, SocketMessageType, SocketReceiver,
        SocketSender,
    };

    struct Ignore;

    #[async_trait]
    impl MessageDispatcher for Ignore {
        type In = String;
        type Out = String;

        async fn dispatch_message(&self, _: &Arc<ConnectionContext<String>>, _: String) -> Result<()> {
            Ok(())
        }
    }

    fn executor() -> ConnectionExecutor<
        crate::message::EndOfMessageDelimitedProtocol<TextCodec>,
        Ignore,
    > {
        DispatcherBuilder::new()
            .use_delimited_protocol(TextCodec)
            .use_dispatcher(Ignore)
            .build()
    }

    #[tokio::test]
    async fn test_write_then_close_sends_close_frame() {
        let (local, remote) = memory_socket_pair();
        let client = Client::start(executor(), local);
        let (mut remote_rx, _remote_tx) = remote.split();

        client.write(&"hi".to_string()).await.unwrap();
        assert_eq!(
            remote_rx.receive().await.unwrap(),
            SocketEvent::Data {
                payload: Bytes::from_static(b"hi"),
                message_type: SocketMessageType::Text,
                end_of_message: true,
            }
        );

        client.close().await;
        assert!(client.is_closed());
        assert_eq!(
            remote_rx.receive().await.unwrap(),
            SocketEvent::Close { code: Some(1000) }
        );
        assert!(client.executor().manager().is_empty());
    }

    #[tokio::test]
    async fn test_peer_close_shuts_client_down() {
        let (local, remote) = memory_socket_pair();
        let client = Client::start(executor(), local);
        let (_remote_rx, mut remote_tx) = remote.split();

        remote_tx.close(CloseStatus::Normal).await.unwrap();
        client.wait_for_shutdown().await;
        assert!(client.context().is_aborted());
    }
}
