//! Fluent builder selecting protocol, dispatcher and options.
//!
//! Exactly one protocol mode is chosen per builder:
//!
//! - [`use_delimited_protocol`](DispatcherBuilder::use_delimited_protocol) -
//!   messages are delimited by the socket's end-of-message markers; the pipes
//!   carry the frame envelope
//! - [`use_custom_protocol`](DispatcherBuilder::use_custom_protocol) - the
//!   protocol finds message boundaries in the raw socket bytes itself
//!
//! `build` only exists once both a protocol and a dispatcher were chosen.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use wspipe::codec::TextCodec;
//! use wspipe::connection::ConnectionContext;
//! use wspipe::dispatch::{DispatcherBuilder, MessageDispatcher};
//! use wspipe::error::Result;
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
//! let executor = DispatcherBuilder::new()
//!     .close_timeout(Duration::from_secs(2))
//!     .use_delimited_protocol(TextCodec)
//!     .use_dispatcher(Echo)
//!     .build();
//! assert!(executor.options().web_sockets.frame_packets());
//! ```

use std::fmt;
use std::time::Duration;

use super::dispatcher::MessageDispatcher;
use super::executor::ConnectionExecutor;
use crate::config::{ConnectionOptions, PipeOptions, TransferFormat};
use crate::message::{DelimitedMessageProtocol, EndOfMessageDelimitedProtocol, MessageProtocol};

/// A protocol waiting for the final maximum frame size.
pub struct ProtocolFactory<P> {
    make: Box<dyn FnOnce(u32) -> P + Send>,
}

impl<P> fmt::Debug for ProtocolFactory<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProtocolFactory")
    }
}

/// Builds a [`ConnectionExecutor`].
///
/// `F` is `()` until a protocol is chosen, `D` is `()` until a dispatcher is.
pub struct DispatcherBuilder<F = (), D = ()> {
    options: ConnectionOptions,
    /// Explicit transfer format, overriding the protocol's preference.
    transfer_format: Option<TransferFormat>,
    protocol: F,
    dispatcher: D,
}

impl DispatcherBuilder {
    /// Start with default options and nothing chosen.
    pub fn new() -> Self {
        Self {
            options: ConnectionOptions::default(),
            transfer_format: None,
            protocol: (),
            dispatcher: (),
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<F, D> DispatcherBuilder<F, D> {
    /// Replace all options at once.
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// How long shutdown waits for the other transport loop.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.options.web_sockets.close_timeout = timeout;
        self
    }

    /// Socket message type for outbound messages.
    ///
    /// Without this the protocol's preference applies, falling back to the
    /// options' transfer format.
    pub fn transfer_format(mut self, format: TransferFormat) -> Self {
        self.transfer_format = Some(format);
        self
    }

    /// Pick a sub-protocol from the ones a client offers.
    pub fn sub_protocol_selector<S>(mut self, selector: S) -> Self
    where
        S: Fn(&[String]) -> Option<String> + Send + Sync + 'static,
    {
        self.options.web_sockets.sub_protocol_selector = Some(std::sync::Arc::new(selector));
        self
    }

    /// Largest frame payload accepted in either direction.
    pub fn max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.options.web_sockets.max_frame_size = max_frame_size;
        self
    }

    /// Ping the peer every `interval`.
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.options.web_sockets.keep_alive_interval = Some(interval);
        self
    }

    /// Abort the socket when nothing arrives within `timeout` of a ping.
    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.options.web_sockets.keep_alive_timeout = Some(timeout);
        self
    }

    /// Watermarks of the socket-to-application pipe.
    pub fn transport_pipe_options(mut self, options: PipeOptions) -> Self {
        self.options.transport_pipe_options = options;
        self
    }

    /// Watermarks of the application-to-socket pipe.
    pub fn application_pipe_options(mut self, options: PipeOptions) -> Self {
        self.options.application_pipe_options = options;
        self
    }

    /// Delimit messages by the socket's end-of-message markers.
    pub fn use_delimited_protocol<T>(
        self,
        protocol: T,
    ) -> DispatcherBuilder<ProtocolFactory<EndOfMessageDelimitedProtocol<T>>, D>
    where
        T: DelimitedMessageProtocol,
    {
        DispatcherBuilder {
            options: self.options,
            transfer_format: self.transfer_format,
            protocol: ProtocolFactory {
                make: Box::new(move |max_frame_size| {
                    EndOfMessageDelimitedProtocol::with_max_frame_size(protocol, max_frame_size)
                }),
            },
            dispatcher: self.dispatcher,
        }
    }

    /// Use a self-delimiting protocol over the raw socket bytes.
    pub fn use_custom_protocol<P>(self, protocol: P) -> DispatcherBuilder<ProtocolFactory<P>, D>
    where
        P: MessageProtocol,
    {
        DispatcherBuilder {
            options: self.options,
            transfer_format: self.transfer_format,
            protocol: ProtocolFactory {
                make: Box::new(move |_| protocol),
            },
            dispatcher: self.dispatcher,
        }
    }

    /// Handle messages with `dispatcher`.
    pub fn use_dispatcher<T: MessageDispatcher>(self, dispatcher: T) -> DispatcherBuilder<F, T> {
        DispatcherBuilder {
            options: self.options,
            transfer_format: self.transfer_format,
            protocol: self.protocol,
            dispatcher,
        }
    }
}

impl<P, D> DispatcherBuilder<ProtocolFactory<P>, D>
where
    P: MessageProtocol,
    D: MessageDispatcher<In = P::In, Out = P::Out>,
{
    /// Build the executor.
    pub fn build(mut self) -> ConnectionExecutor<P, D> {
        let protocol = (self.protocol.make)(self.options.web_sockets.max_frame_size);
        if let Some(format) = self.transfer_format.or_else(|| protocol.transfer_format()) {
            self.options.web_sockets.transfer_format = format;
        }
        ConnectionExecutor::new(protocol, self.dispatcher, self.options)
    }
}

impl<F: fmt::Debug, D> fmt::Debug for DispatcherBuilder<F, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("options", &self.options)
            .field("transfer_format", &self.transfer_format)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}
