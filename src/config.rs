//! Connection, socket and pipe configuration.
//!
//! All options are plain structs with `Default` impls; the server and client
//! builders expose fluent setters over them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default time to wait for a graceful close before aborting the socket.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default unconsumed byte count at which a pipe writer's flush suspends (64 KiB).
pub const DEFAULT_PAUSE_WRITER_THRESHOLD: usize = 64 * 1024;

/// Default unconsumed byte count below which a suspended flush resumes (32 KiB).
pub const DEFAULT_RESUME_WRITER_THRESHOLD: usize = DEFAULT_PAUSE_WRITER_THRESHOLD / 2;

/// Default maximum payload length of a single frame (max i32).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 2_147_483_647;

/// Selects the `Sec-WebSocket-Protocol` value from the protocols a client offered.
pub type SubProtocolSelector = Arc<dyn Fn(&[String]) -> Option<String> + Send + Sync>;

/// Socket message type used for outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferFormat {
    /// UTF-8 text messages.
    #[default]
    Text,
    /// Binary messages.
    Binary,
}

/// Backpressure watermarks for one direction of a duplex pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Flushing suspends once this many bytes are unconsumed. `0` disables backpressure.
    pub pause_writer_threshold: usize,
    /// A suspended flush resumes once unconsumed bytes drop below this.
    pub resume_writer_threshold: usize,
}

impl PipeOptions {
    /// Create options with explicit watermarks.
    ///
    /// The resume threshold is clamped so it never exceeds the pause threshold.
    pub fn new(pause_writer_threshold: usize, resume_writer_threshold: usize) -> Self {
        Self {
            pause_writer_threshold,
            resume_writer_threshold: resume_writer_threshold.min(pause_writer_threshold),
        }
    }

    /// Options that never apply backpressure.
    pub fn unbounded() -> Self {
        Self::new(0, 0)
    }
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PAUSE_WRITER_THRESHOLD, DEFAULT_RESUME_WRITER_THRESHOLD)
    }
}

/// Socket-level options.
#[derive(Clone)]
pub struct WebSocketOptions {
    /// How long the transport waits for the other loop during shutdown.
    pub close_timeout: Duration,
    /// Picks a sub-protocol during the handshake.
    pub sub_protocol_selector: Option<SubProtocolSelector>,
    /// Message type of outbound socket messages.
    pub transfer_format: TransferFormat,
    /// Largest frame payload accepted by the frame reader.
    pub max_frame_size: u32,
    /// How often a ping is sent to the peer. `None` disables keep-alive.
    pub keep_alive_interval: Option<Duration>,
    /// How long to wait for a pong after a ping before aborting the socket.
    ///
    /// Only used together with `keep_alive_interval`. Any frame received from
    /// the peer counts as an answer.
    pub keep_alive_timeout: Option<Duration>,
    /// Whether the pipes carry the length/flag frame envelope.
    ///
    /// Set from the protocol mode chosen on the builder, never by users.
    pub(crate) frame_packets: bool,
}

impl WebSocketOptions {
    /// Whether frame enveloping is enabled.
    #[inline]
    pub fn frame_packets(&self) -> bool {
        self.frame_packets
    }

    /// Run the configured sub-protocol selector, if any.
    pub fn select_sub_protocol(&self, offered: &[String]) -> Option<String> {
        self.sub_protocol_selector
            .as_ref()
            .and_then(|select| select(offered))
    }
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            sub_protocol_selector: None,
            transfer_format: TransferFormat::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            keep_alive_interval: None,
            keep_alive_timeout: None,
            frame_packets: false,
        }
    }
}

impl fmt::Debug for WebSocketOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketOptions")
            .field("close_timeout", &self.close_timeout)
            .field(
                "sub_protocol_selector",
                &self.sub_protocol_selector.as_ref().map(|_| ".."),
            )
            .field("transfer_format", &self.transfer_format)
            .field("max_frame_size", &self.max_frame_size)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("keep_alive_timeout", &self.keep_alive_timeout)
            .field("frame_packets", &self.frame_packets)
            .finish()
    }
}

/// Everything needed to create one connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Socket-level options.
    pub web_sockets: WebSocketOptions,
    /// Watermarks for the socket-to-application pipe.
    pub transport_pipe_options: PipeOptions,
    /// Watermarks for the application-to-socket pipe.
    pub application_pipe_options: PipeOptions,
}
