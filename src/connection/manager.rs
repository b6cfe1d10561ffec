//! Registry of live connections.
//!
//! Connections are registered when created and removed only after disposal
//! finished, so a connection still listed here has tasks that have not fully
//! drained.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use tracing::{debug, error, trace};

use super::connection::WebSocketConnection;
use super::context::User;
use crate::config::ConnectionOptions;
use crate::message::MessageWriter;

/// Concurrent map of connection id to connection.
pub struct ConnectionManager<Out> {
    connections: DashMap<String, Arc<WebSocketConnection<Out>>>,
}

impl<Out: Send + Sync + 'static> ConnectionManager<Out> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Create and register a connection with a fresh id.
    pub fn create_connection(
        &self,
        protocol: Arc<dyn MessageWriter<Message = Out>>,
        options: &ConnectionOptions,
        user: Option<User>,
    ) -> Arc<WebSocketConnection<Out>> {
        let id = new_connection_id();
        debug!(connection_id = %id, "Created new connection");

        let connection = Arc::new(WebSocketConnection::new(id.clone(), user, protocol, options));
        self.connections.insert(id, connection.clone());
        connection
    }

    /// Dispose a connection, then remove it regardless of how disposal went.
    pub async fn dispose_and_remove(
        &self,
        connection: &WebSocketConnection<Out>,
        close_gracefully: bool,
    ) {
        if let Err(e) = connection.dispose(close_gracefully).await {
            error!(connection_id = %connection.id(), error = %e, "Failed disposing connection");
        }

        self.remove(connection.id());
    }

    fn remove(&self, id: &str) {
        if self.connections.remove(id).is_some() {
            trace!(connection_id = %id, "Removed connection");
        }
    }

    /// Look up a live connection.
    pub fn get(&self, id: &str) -> Option<Arc<WebSocketConnection<Out>>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids of every registered connection.
    pub fn ids(&self) -> Vec<String> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Abort a connection, evicting it once its tasks finished.
    ///
    /// Returns `false` if no connection has this id.
    pub fn abort(&self, id: &str) -> bool {
        match self.get(id) {
            Some(connection) => {
                connection.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every registered connection.
    pub fn abort_all(&self) {
        for entry in self.connections.iter() {
            entry.value().abort();
        }
    }
}

impl<Out: Send + Sync + 'static> Default for ConnectionManager<Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out> std::fmt::Debug for ConnectionManager<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connections.len())
            .finish()
    }
}

/// 16 bytes from the thread-local CSPRNG rendered as URL-safe base64 without
/// padding. Every bit is random; no version or variant bits are fixed.
fn new_connection_id() -> String {
    let bytes: [u8; 16] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
