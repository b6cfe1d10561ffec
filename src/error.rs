//! Error types for wspipe.

use thiserror::Error;

/// Main error type for all pipeline operations.
#[derive(Debug, Error)]
pub enum WsPipeError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol or transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Framing error (malformed length prefix, bad flag byte, truncated frame).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A message protocol rejected a structurally complete message.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Payload that must be UTF-8 was not.
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Error raised by application callback code.
    #[error("Application error: {0}")]
    Application(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The peer closed the connection without a close handshake.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection was aborted locally.
    #[error("Connection aborted")]
    ConnectionAborted,

    /// The operation was canceled.
    #[error("Operation canceled")]
    Canceled,
}

impl WsPipeError {
    /// Wrap an arbitrary application error.
    pub fn application<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Application(error.into())
    }

    /// Whether this error means the byte stream itself is unusable.
    #[inline]
    pub fn is_framing_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Result type alias using WsPipeError.
pub type Result<T> = std::result::Result<T, WsPipeError>;
