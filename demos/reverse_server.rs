//! Reverse Server - answers every text message with its characters reversed.
//!
//! This example demonstrates:
//! - Building an executor with a delimited text protocol
//! - Writing replies through the connection context
//! - Serving WebSocket connections until Ctrl-C
//!
//! # Trying it
//!
//! ```text
//! cargo run --example reverse_server
//! websocat ws://127.0.0.1:9000
//! > Ping
//! gniP
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wspipe::codec::TextCodec;
use wspipe::{ConnectionContext, DispatcherBuilder, MessageDispatcher, Result, WebSocketServer, WsPipeError};

/// Replies with the message reversed.
struct Reverse;

#[async_trait]
impl MessageDispatcher for Reverse {
    type In = String;
    type Out = String;

    async fn on_connected(&self, connection: &Arc<ConnectionContext<String>>) -> Result<()> {
        info!(connection_id = connection.id(), "Client connected");
        Ok(())
    }

    async fn on_disconnected(
        &self,
        connection: &Arc<ConnectionContext<String>>,
        error: Option<WsPipeError>,
    ) -> Result<()> {
        info!(connection_id = connection.id(), error = ?error, "Client disconnected");
        Ok(())
    }

    async fn dispatch_message(&self, connection: &Arc<ConnectionContext<String>>, message: String) -> Result<()> {
        connection.write(&message.chars().rev().collect()).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let executor = DispatcherBuilder::new()
        .keep_alive_interval(Duration::from_secs(30))
        .keep_alive_timeout(Duration::from_secs(10))
        .use_delimited_protocol(TextCodec)
        .use_dispatcher(Reverse)
        .build();

    let listener = TcpListener::bind("127.0.0.1:9000").await?;
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        }
    });

    WebSocketServer::new(executor).serve(listener, shutdown).await
}
