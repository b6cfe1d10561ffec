//! WebSocket server over `tokio-tungstenite`.
//!
//! The [`WebSocketServer`] performs the handshake (including sub-protocol
//! selection) and runs every accepted socket through a
//! [`ConnectionExecutor`]. The lifecycle of one connection:
//! 1. Handshake, choosing a `Sec-WebSocket-Protocol` if a selector is set
//! 2. Register the connection and start its transport and dispatch tasks
//! 3. Wait for either to finish
//! 4. Dispose (bounded by the close timeout) and unregister
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//! use wspipe::codec::TextCodec;
//! use wspipe::connection::ConnectionContext;
//! use wspipe::dispatch::{DispatcherBuilder, MessageDispatcher};
//! use wspipe::error::Result;
//! use wspipe::server::WebSocketServer;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl MessageDispatcher for Echo {
//!     type In = String;
//!     type Out = String;
//!
//!     async fn dispatch_message(&self, connection: &Arc<ConnectionContext<String>>, message: String) -> Result<()> {
//!         connection.write(&message).await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let executor = DispatcherBuilder::new()
//!         .use_delimited_protocol(TextCodec)
//!         .use_dispatcher(Echo)
//!         .build();
//!
//!     let listener = TcpListener::bind("127.0.0.1:9000").await?;
//!     WebSocketServer::new(executor)
//!         .serve(listener, CancellationToken::new())
//!         .await
//! }
//! ```

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WebSocketOptions;
use crate::connection::{ConnectionManager, User};
use crate::dispatch::{ConnectionExecutor, MessageDispatcher};
use crate::error::Result;
use crate::message::MessageProtocol;
use crate::transport::TungsteniteSocket;

/// Pause after a failed accept, so a persistent failure does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Source of incoming byte streams for [`WebSocketServer::serve`].
#[async_trait]
pub trait Listener: Send {
    /// Accepted stream type.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// Peer address type.
    type Addr: fmt::Display + Send + 'static;

    /// Wait for the next stream.
    async fn accept(&mut self) -> io::Result<(Self::Stream, Self::Addr)>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<Self::Addr>;
}

#[async_trait]
impl Listener for TcpListener {
    type Stream = tokio::net::TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Accepts WebSocket connections and runs them to completion.
pub struct WebSocketServer<P: MessageProtocol, D> {
    executor: ConnectionExecutor<P, D>,
}

impl<P, D> WebSocketServer<P, D>
where
    P: MessageProtocol,
    D: MessageDispatcher<In = P::In, Out = P::Out>,
{
    /// Serve connections with `executor`.
    pub fn new(executor: ConnectionExecutor<P, D>) -> Self {
        Self { executor }
    }

    /// Get the executor.
    #[inline]
    pub fn executor(&self) -> &ConnectionExecutor<P, D> {
        &self.executor
    }

    /// Get the registry of live connections.
    #[inline]
    pub fn connections(&self) -> &Arc<ConnectionManager<P::Out>> {
        self.executor.manager()
    }

    /// Handshake on `stream` and run the connection until it ends.
    pub async fn accept<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.accept_with_user(stream, None).await
    }

    /// Like [`accept`](Self::accept), attaching `user` to the connection.
    pub async fn accept_with_user<S>(&self, stream: S, user: Option<User>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let options = &self.executor.options().web_sockets;
        let mut sub_protocol = None;
        let socket = accept_hdr_async(stream, |request: &Request, response: Response| {
            select_sub_protocol(options, request, response, &mut sub_protocol)
        })
        .await?;

        info!(sub_protocol = ?sub_protocol, "Socket opened");
        self.executor
            .execute(TungsteniteSocket::new(socket), user)
            .await;
        info!("Socket closed");
        Ok(())
    }

    /// Accept connections from `listener` until `shutdown` fires, then abort
    /// the ones still running.
    ///
    /// A failed accept is logged and retried; it never stops the server.
    pub async fn serve<L: Listener>(&self, mut listener: L, shutdown: CancellationToken) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "WebSocket server listening");
        }

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accepting connection failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => continue,
                    }
                }
            };
            debug!(%peer, "Accepted connection");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.accept(stream).await {
                    warn!(%peer, error = %e, "WebSocket connection failed");
                }
            });
        }

        info!(connections = self.connections().len(), "WebSocket server shutting down");
        self.connections().abort_all();
        Ok(())
    }
}

fn select_sub_protocol(
    options: &WebSocketOptions,
    request: &Request,
    mut response: Response,
    selected: &mut Option<String>,
) -> std::result::Result<Response, ErrorResponse> {
    let offered: Vec<String> = request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|protocol| !protocol.is_empty())
        .map(String::from)
        .collect();

    if let Some(protocol) = options.select_sub_protocol(&offered) {
        if let Ok(value) = HeaderValue::from_str(&protocol) {
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
            *selected = Some(protocol);
        }
    }
    Ok(response)
}

impl<P: MessageProtocol, D> Clone for WebSocketServer<P, D> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
        }
    }
}

impl<P: MessageProtocol, D> fmt::Debug for WebSocketServer<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("executor", &self.executor)
            .finish()
    }
}
