//! Transport module - moves bytes between a WebSocket and the pipes.
//!
//! Provides:
//! - [`WebSocket`] abstraction split into receiving and sending halves
//! - [`TungsteniteSocket`] over `tokio-tungstenite` streams
//! - [`MemorySocket`] pairs for tests and in-process peers
//! - [`SocketTransport`] running the receive/send loops and the close timeout

mod adapter;
mod memory;
mod socket;
mod tungstenite;

pub use adapter::{SocketTransport, TransportOutcome};
pub use memory::{
    memory_socket_pair, memory_socket_pair_with_capacity, MemoryReceiver, MemorySender,
    MemorySocket, DEFAULT_MEMORY_SOCKET_CAPACITY,
};
pub use socket::{
    CloseStatus, SocketEvent, SocketMessageType, SocketReceiver, SocketSender, WebSocket,
};
pub use tungstenite::{TungsteniteReceiver, TungsteniteSender, TungsteniteSocket};
