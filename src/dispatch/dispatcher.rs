//! Application callbacks invoked by the dispatch loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::connection::ConnectionContext;
use crate::error::{Result, WsPipeError};

/// Handles the messages of every connection of one server or client.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use async_trait::async_trait;
/// use wspipe::connection::ConnectionContext;
/// use wspipe::dispatch::MessageDispatcher;
/// use wspipe::error::Result;
///
/// struct Reverse;
///
/// #[async_trait]
/// impl MessageDispatcher for Reverse {
///     type In = String;
///     type Out = String;
///
///     async fn dispatch_message(
///         &self,
///         connection: &Arc<ConnectionContext<String>>,
///         message: String,
///     ) -> Result<()> {
///         connection.write(&message.chars().rev().collect()).await
///     }
/// }
/// ```
#[async_trait]
pub trait MessageDispatcher: Send + Sync + 'static {
    /// Messages received from the peer.
    type In: Send + 'static;
    /// Messages written to the peer.
    type Out: Send + Sync + 'static;

    /// Called once before any message is dispatched.
    ///
    /// An error aborts the connection; `on_disconnected` is not called.
    async fn on_connected(&self, _connection: &Arc<ConnectionContext<Self::Out>>) -> Result<()> {
        Ok(())
    }

    /// Called once after the dispatch loop ended and the connection aborted.
    ///
    /// `error` is what ended the connection, if it did not end cleanly.
    async fn on_disconnected(
        &self,
        _connection: &Arc<ConnectionContext<Self::Out>>,
        _error: Option<WsPipeError>,
    ) -> Result<()> {
        Ok(())
    }

    /// Called for each parsed message, in order.
    async fn dispatch_message(
        &self,
        connection: &Arc<ConnectionContext<Self::Out>>,
        message: Self::In,
    ) -> Result<()>;

    /// Called when the protocol rejected a complete message. The loop continues.
    async fn on_parse_error(
        &self,
        _connection: &Arc<ConnectionContext<Self::Out>>,
        _error: WsPipeError,
    ) {
    }

    /// Called when `dispatch_message` failed. The loop continues.
    async fn on_dispatch_error(
        &self,
        connection: &Arc<ConnectionContext<Self::Out>>,
        error: WsPipeError,
    ) {
        error!(connection_id = %connection.id(), error = %error, "Error dispatching message");
    }
}

#[async_trait]
impl<D: MessageDispatcher> MessageDispatcher for Arc<D> {
    type In = D::In;
    type Out = D::Out;

    async fn on_connected(&self, connection: &Arc<ConnectionContext<Self::Out>>) -> Result<()> {
        (**self).on_connected(connection).await
    }

    async fn on_disconnected(
        &self,
        connection: &Arc<ConnectionContext<Self::Out>>,
        error: Option<WsPipeError>,
    ) -> Result<()> {
        (**self).on_disconnected(connection, error).await
    }

    async fn dispatch_message(
        &self,
        connection: &Arc<ConnectionContext<Self::Out>>,
        message: Self::In,
    ) -> Result<()> {
        (**self).dispatch_message(connection, message).await
    }

    async fn on_parse_error(&self, connection: &Arc<ConnectionContext<Self::Out>>, error: WsPipeError) {
        (**self).on_parse_error(connection, error).await
    }

    async fn on_dispatch_error(
        &self,
        connection: &Arc<ConnectionContext<Self::Out>>,
        error: WsPipeError,
    ) {
        (**self).on_dispatch_error(connection, error).await
    }
}
