//! Runs whole connections: registry entry, tasks and teardown.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::dispatcher::MessageDispatcher;
use super::handler::ConnectionHandler;
use crate::config::ConnectionOptions;
use crate::connection::{ConnectionManager, User, WebSocketConnection};
use crate::message::{MessageProtocol, MessageWriter, ProtocolWriter};
use crate::transport::WebSocket;

/// Creates, runs and disposes connections for one protocol and dispatcher.
///
/// Cheap to clone; clones share the connection registry.
pub struct ConnectionExecutor<P: MessageProtocol, D> {
    manager: Arc<ConnectionManager<P::Out>>,
    handler: Arc<ConnectionHandler<P, D>>,
    writer: Arc<dyn MessageWriter<Message = P::Out>>,
    options: ConnectionOptions,
}

impl<P, D> ConnectionExecutor<P, D>
where
    P: MessageProtocol,
    D: MessageDispatcher<In = P::In, Out = P::Out>,
{
    /// Create an executor with its own connection registry.
    ///
    /// Frame packets are enabled when `protocol` is framed.
    pub fn new(protocol: P, dispatcher: D, options: ConnectionOptions) -> Self {
        Self::with_manager(protocol, dispatcher, options, Arc::new(ConnectionManager::new()))
    }

    /// Create an executor registering connections in `manager`.
    pub fn with_manager(
        protocol: P,
        dispatcher: D,
        mut options: ConnectionOptions,
        manager: Arc<ConnectionManager<P::Out>>,
    ) -> Self {
        options.web_sockets.frame_packets = protocol.is_framed();

        let protocol = Arc::new(protocol);
        Self {
            manager,
            writer: Arc::new(ProtocolWriter::new(protocol.clone())),
            handler: Arc::new(ConnectionHandler::new(protocol, dispatcher)),
            options,
        }
    }

    /// Get the connection registry.
    #[inline]
    pub fn manager(&self) -> &Arc<ConnectionManager<P::Out>> {
        &self.manager
    }

    /// Get the options every connection is created with.
    #[inline]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Register a connection over `socket` and start its tasks.
    pub fn start<W: WebSocket>(&self, socket: W, user: Option<User>) -> Arc<WebSocketConnection<P::Out>> {
        let connection = self
            .manager
            .create_connection(self.writer.clone(), &self.options, user);

        let handler = self.handler.clone();
        connection.activate(socket, move |context, input| async move {
            handler.run(context, input).await;
        });
        connection
    }

    /// Wait for a started connection to end, then dispose and unregister it.
    pub async fn finish(&self, connection: &WebSocketConnection<P::Out>) {
        connection.wait_for_either().await;
        trace!(connection_id = %connection.id(), "Connection ending");
        self.manager.dispose_and_remove(connection, true).await;
    }

    /// Run a connection over `socket` to completion.
    pub async fn execute<W: WebSocket>(&self, socket: W, user: Option<User>) {
        let connection = self.start(socket, user);
        self.finish(&connection).await;
    }
}

impl<P: MessageProtocol, D> Clone for ConnectionExecutor<P, D> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            handler: self.handler.clone(),
            writer: self.writer.clone(),
            options: self.options.clone(),
        }
    }
}

impl<P: MessageProtocol, D> fmt::Debug for ConnectionExecutor<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionExecutor")
            .field("connections", &self.manager.len())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::codec::{NullTerminatedTextProtocol, TextCodec};
    use crate::connection::ConnectionContext;
    use crate::error::Result;
    use crate::message::EndOfMessageDelimitedProtocol;
    use crate::transport::{
        memory_socket_pair, CloseStatus, SocketEvent, SocketMessageType, SocketReceiver,
        SocketSender,
    };

    struct Echo;

    #[async_trait]
    impl MessageDispatcher for Echo {
        type In = String;
        type Out = String;

        async fn dispatch_message(&self, connection: &Arc<ConnectionContext<String>>, message: String) -> Result<()> {
            connection.write(&message).await
        }
    }

    #[test]
    fn test_frame_packets_follow_protocol() {
        let framed = ConnectionExecutor::new(
            EndOfMessageDelimitedProtocol::new(TextCodec),
            Echo,
            ConnectionOptions::default(),
        );
        assert!(framed.options().web_sockets.frame_packets());

        let custom = ConnectionExecutor::new(NullTerminatedTextProtocol, Echo, ConnectionOptions::default());
        assert!(!custom.options().web_sockets.frame_packets());
    }

    #[tokio::test]
    async fn test_execute_echo_and_unregister() {
        let executor = ConnectionExecutor::new(
            EndOfMessageDelimitedProtocol::new(TextCodec),
            Echo,
            ConnectionOptions::default(),
        );
        let (client, server) = memory_socket_pair();

        let run = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(server, None).await })
        };

        let (mut client_rx, mut client_tx) = client.split();
        client_tx
            .send(Bytes::from_static(b"hello"), SocketMessageType::Text, true)
            .await
            .unwrap();
        assert_eq!(
            client_rx.receive().await.unwrap(),
            SocketEvent::Data {
                payload: Bytes::from_static(b"hello"),
                message_type: SocketMessageType::Text,
                end_of_message: true,
            }
        );
        assert_eq!(executor.manager().len(), 1);

        client_tx.close(CloseStatus::Normal).await.unwrap();
        assert_eq!(
            client_rx.receive().await.unwrap(),
            SocketEvent::Close { code: Some(1000) }
        );

        run.await.unwrap();
        assert!(executor.manager().is_empty());
    }
}
