//! The per-connection dispatch loop.
//!
//! Reads the application input, parses as many messages as the buffer holds
//! and hands each one to the dispatcher. Parse errors are reported and
//! skipped; framing errors end the connection.

use std::sync::Arc;

use tracing::{debug, error};

use super::dispatcher::MessageDispatcher;
use crate::connection::ConnectionContext;
use crate::error::{Result, WsPipeError};
use crate::message::MessageProtocol;
use crate::pipe::PipeReader;
use crate::protocol::ByteSequence;

/// Runs the dispatch loop of one connection.
pub struct ConnectionHandler<P, D> {
    protocol: Arc<P>,
    dispatcher: D,
}

impl<P, D> ConnectionHandler<P, D>
where
    P: MessageProtocol,
    D: MessageDispatcher<In = P::In, Out = P::Out>,
{
    /// Create a handler parsing with `protocol` and dispatching to `dispatcher`.
    pub fn new(protocol: Arc<P>, dispatcher: D) -> Self {
        Self {
            protocol,
            dispatcher,
        }
    }

    /// Get the protocol.
    #[inline]
    pub fn protocol(&self) -> &Arc<P> {
        &self.protocol
    }

    /// Run the connection until its input ends, then report the disconnect.
    pub async fn run(&self, connection: Arc<ConnectionContext<P::Out>>, mut input: PipeReader) {
        debug!("Connection handler starting");

        if let Err(e) = self.dispatcher.on_connected(&connection).await {
            error!(error = %e, "Error dispatching on_connected");
            connection.abort();
            debug!("Connection handler ending");
            return;
        }

        let error = match self.dispatch_messages(&connection, &mut input).await {
            Ok(()) | Err(WsPipeError::Canceled) => connection.take_close_error(),
            Err(e) => {
                error!(error = %e, "Error processing requests");
                Some(e)
            }
        };

        // Every write observes the abort before the disconnect is reported.
        connection.abort_async().await;
        if let Err(e) = self.dispatcher.on_disconnected(&connection, error).await {
            error!(error = %e, "Error dispatching on_disconnected");
        }

        debug!("Connection handler ending");
    }

    async fn dispatch_messages(
        &self,
        connection: &Arc<ConnectionContext<P::Out>>,
        input: &mut PipeReader,
    ) -> Result<()> {
        loop {
            let result = input.read().await?;
            if result.is_canceled {
                return Ok(());
            }

            let mut buffer = result.buffer;
            let total = buffer.len();
            let parsed = self.parse_messages(connection, &mut buffer).await;

            // Consumed what was parsed; examined everything so an incomplete
            // message waits for more bytes.
            input.advance_to(total - buffer.len(), total);
            parsed?;

            if result.is_completed {
                if !buffer.is_empty() {
                    return Err(WsPipeError::Protocol(
                        "Connection terminated while reading a message.".into(),
                    ));
                }
                return Ok(());
            }
        }
    }

    async fn parse_messages(
        &self,
        connection: &Arc<ConnectionContext<P::Out>>,
        buffer: &mut ByteSequence,
    ) -> Result<()> {
        while !buffer.is_empty() {
            let before = buffer.len();
            match self.protocol.try_parse_message(buffer) {
                Ok(Some(message)) => {
                    if let Err(e) = self.dispatcher.dispatch_message(connection, message).await {
                        self.dispatcher.on_dispatch_error(connection, e).await;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_framing_error() => return Err(e),
                Err(e) => {
                    let stalled = buffer.len() == before;
                    self.dispatcher.on_parse_error(connection, e).await;
                    if stalled {
                        return Err(WsPipeError::Protocol(
                            "Message protocol failed without consuming input".into(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<P, D> std::fmt::Debug for ConnectionHandler<P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler").finish_non_exhaustive()
    }
}
