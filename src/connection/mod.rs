//! Connection module - per-connection state and lifecycle.
//!
//! - [`ConnectionContext`] - what application code writes through and aborts
//! - [`WebSocketConnection`] - the application and transport tasks of one
//!   socket, and their ordered teardown
//! - [`ConnectionManager`] - registry of live connections keyed by random id

#[allow(clippy::module_inception)]
mod connection;
mod context;
mod manager;

pub use connection::WebSocketConnection;
pub use context::{ConnectionContext, ConnectionState, User};
pub use manager::ConnectionManager;
