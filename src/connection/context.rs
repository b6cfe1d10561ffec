//! Application-facing connection context.
//!
//! A [`ConnectionContext`] is what dispatchers and application code hold on
//! to. It serializes writes through a single-writer lock and owns the abort
//! state machine:
//!
//! ```text
//! Active -> Aborting -> Aborted -> Disposed
//! ```
//!
//! `abort` is idempotent. It cancels pending flushes and reads immediately and
//! detaches a task that waits for in-flight writes before signalling that the
//! abort completed.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, WsPipeError};
use crate::message::MessageWriter;
use crate::pipe::{PipeHandle, PipeWriter};

/// Opaque per-connection user data attached when the connection is accepted.
pub type User = Arc<dyn Any + Send + Sync>;

/// Lifecycle state of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Writes go through.
    Active = 0,
    /// Abort requested; in-flight writes are draining.
    Aborting = 1,
    /// Every write observed the abort.
    Aborted = 2,
    /// The connection was disposed.
    Disposed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Active,
            1 => ConnectionState::Aborting,
            2 => ConnectionState::Aborted,
            _ => ConnectionState::Disposed,
        }
    }
}

/// Connection handle passed to dispatchers.
///
/// `Out` is the type of messages written to the peer.
pub struct ConnectionContext<Out> {
    id: String,
    user: Option<User>,
    protocol: Arc<dyn MessageWriter<Message = Out>>,
    writer: Arc<Mutex<PipeWriter>>,
    /// Handle of the application output (towards the socket).
    output: PipeHandle,
    /// Handle of the application input (from the socket).
    input: PipeHandle,
    state: AtomicU8,
    aborted: CancellationToken,
    abort_completed: CancellationToken,
    closed: CancellationToken,
    close_error: parking_lot::Mutex<Option<WsPipeError>>,
}

impl<Out: Send + Sync + 'static> ConnectionContext<Out> {
    pub(crate) fn new(
        id: String,
        user: Option<User>,
        protocol: Arc<dyn MessageWriter<Message = Out>>,
        writer: PipeWriter,
        input: PipeHandle,
        closed: CancellationToken,
    ) -> Self {
        let output = writer.handle();
        Self {
            id,
            user,
            protocol,
            writer: Arc::new(Mutex::new(writer)),
            output,
            input,
            state: AtomicU8::new(ConnectionState::Active as u8),
            aborted: CancellationToken::new(),
            abort_completed: CancellationToken::new(),
            closed,
            close_error: parking_lot::Mutex::new(None),
        }
    }

    /// Get the connection id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the user data attached to this connection, if it has type `T`.
    pub fn user<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.user.as_ref().and_then(|user| user.downcast_ref::<T>())
    }

    /// Get the current lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        match ConnectionState::from_u8(self.state.load(Ordering::Acquire)) {
            ConnectionState::Aborting if self.abort_completed.is_cancelled() => {
                ConnectionState::Aborted
            }
            state => state,
        }
    }

    /// Check if the connection was aborted (or is being aborted).
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state() != ConnectionState::Active
    }

    /// Token cancelled when the connection is aborted.
    pub fn aborted(&self) -> CancellationToken {
        self.aborted.clone()
    }

    /// Token cancelled once the connection has been torn down.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Write one message to the peer.
    ///
    /// Writes are serialized; a write waits for the one in flight. Writing to
    /// an aborted connection does nothing. A failed write stores its error,
    /// aborts the connection and returns [`WsPipeError::ConnectionAborted`].
    pub async fn write(&self, message: &Out) -> Result<()> {
        self.write_inner(message, None).await
    }

    /// Like [`write`](Self::write), but gives up with
    /// [`WsPipeError::Canceled`] when `cancel` fires while waiting for the lock
    /// or for backpressure to clear.
    pub async fn write_cancellable(&self, message: &Out, cancel: &CancellationToken) -> Result<()> {
        self.write_inner(message, Some(cancel)).await
    }

    async fn write_inner(&self, message: &Out, cancel: Option<&CancellationToken>) -> Result<()> {
        let mut writer = match self.writer.try_lock() {
            Ok(writer) => writer,
            Err(_) => match cancel {
                Some(cancel) => tokio::select! {
                    _ = cancel.cancelled() => return Err(WsPipeError::Canceled),
                    writer = self.writer.lock() => writer,
                },
                None => self.writer.lock().await,
            },
        };

        if self.is_aborted() {
            return Ok(());
        }

        if let Err(e) = self.protocol.write_message(message, &mut *writer) {
            drop(writer);
            return Err(self.fail(e));
        }

        // The flush is polled first so the message is always published; the
        // token only interrupts a wait on backpressure.
        let flushed = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                flushed = writer.flush() => flushed,
                _ = cancel.cancelled() => return Err(WsPipeError::Canceled),
            },
            None => writer.flush().await,
        };

        if flushed.is_completed && !flushed.is_canceled {
            debug!(connection_id = %self.id, "Write after transport completed was discarded");
        }
        Ok(())
    }

    fn fail(&self, error: WsPipeError) -> WsPipeError {
        warn!(connection_id = %self.id, error = %error, "Write failed, aborting connection");
        self.close_error.lock().get_or_insert(error);
        self.abort();
        WsPipeError::ConnectionAborted
    }

    /// Abort the connection.
    ///
    /// Pending and future writes stop, the dispatch loop's pending read is
    /// released and [`aborted`](Self::aborted) fires. Only the first call
    /// has an effect beyond cancelling a pending flush.
    pub fn abort(&self) {
        // A write stuck on backpressure must let go even on repeated calls.
        self.output.cancel_pending_flush();

        if self
            .state
            .compare_exchange(
                ConnectionState::Active as u8,
                ConnectionState::Aborting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        debug!(connection_id = %self.id, "Aborting connection");
        self.input.cancel_pending_read();
        self.aborted.cancel();

        let writer = self.writer.clone();
        let completed = self.abort_completed.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _writes_done = writer.lock().await;
                    completed.cancel();
                });
            }
            Err(_) => {
                // No runtime to detach onto; only an idle writer can be skipped.
                if writer.try_lock().is_ok() {
                    completed.cancel();
                }
            }
        }
    }

    /// Abort and wait until every write has observed it.
    pub async fn abort_async(&self) {
        self.abort();

        // Holding the lock once after the abort flag is set means every
        // in-flight write has finished.
        drop(self.writer.lock().await);
        self.abort_completed.cancel();
        self.advance_state(ConnectionState::Aborted);
    }

    /// Wait until no write holds the lock.
    pub(crate) async fn wait_for_writes(&self) {
        drop(self.writer.lock().await);
    }

    pub(crate) fn mark_disposed(&self) {
        self.advance_state(ConnectionState::Disposed);
    }

    fn advance_state(&self, next: ConnectionState) {
        self.state.fetch_max(next as u8, Ordering::AcqRel);
    }

    /// Take the error that caused the connection to abort, if any.
    pub(crate) fn take_close_error(&self) -> Option<WsPipeError> {
        self.close_error.lock().take()
    }
}

impl<Out: Send + Sync + 'static> fmt::Debug for ConnectionContext<Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::FutureExt;

    use super::*;
    use crate::codec::NullTerminatedTextProtocol;
    use crate::config::PipeOptions;
    use crate::message::ProtocolWriter;
    use crate::pipe::{pipe, PipeReader};
    use crate::protocol::BufferWriter;

    struct Failing;

    impl MessageWriter for Failing {
        type Message = String;

        fn write_message(&self, _: &String, _: &mut dyn BufferWriter) -> Result<()> {
            Err(WsPipeError::Parse("cannot encode".into()))
        }
    }

    fn context_with(
        protocol: Arc<dyn MessageWriter<Message = String>>,
        options: PipeOptions,
    ) -> (Arc<ConnectionContext<String>>, PipeReader) {
        let (writer, reader) = pipe(options);
        let (_, input) = pipe(PipeOptions::default());
        let context = ConnectionContext::new(
            "test".to_string(),
            None,
            protocol,
            writer,
            input.handle(),
            CancellationToken::new(),
        );
        (Arc::new(context), reader)
    }

    fn text_context() -> (Arc<ConnectionContext<String>>, PipeReader) {
        let protocol = Arc::new(ProtocolWriter::new(Arc::new(NullTerminatedTextProtocol)));
        context_with(protocol, PipeOptions::default())
    }

    #[tokio::test]
    async fn test_write_reaches_pipe() {
        let (context, mut reader) = text_context();
        context.write(&"hi".to_string()).await.unwrap();

        let result = reader.read().await.unwrap();
        assert_eq!(result.buffer.to_vec(), b"hi\0");
    }

    #[tokio::test]
    async fn test_write_after_abort_is_noop() {
        let (context, mut reader) = text_context();
        context.abort();
        context.write(&"lost".to_string()).await.unwrap();

        assert_eq!(reader.handle().unconsumed_bytes(), 0);
        assert!(reader.read().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_failed_write_aborts_and_stores_error() {
        let (context, _reader) = context_with(Arc::new(Failing), PipeOptions::default());

        let err = context.write(&"x".to_string()).await.unwrap_err();
        assert!(matches!(err, WsPipeError::ConnectionAborted));
        assert!(context.is_aborted());
        assert!(context.aborted().is_cancelled());
        assert!(matches!(context.take_close_error(), Some(WsPipeError::Parse(_))));
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let (context, _reader) = text_context();
        context.abort();
        context.abort();
        context.abort_async().await;
        assert_eq!(context.state(), ConnectionState::Aborted);

        context.mark_disposed();
        context.abort();
        assert_eq!(context.state(), ConnectionState::Disposed);
    }

    #[tokio::test]
    async fn test_abort_releases_write_stuck_on_backpressure() {
        let protocol = Arc::new(ProtocolWriter::new(Arc::new(NullTerminatedTextProtocol)));
        let (context, _reader) = context_with(protocol, PipeOptions::new(4, 2));

        let writer = {
            let context = context.clone();
            tokio::spawn(async move { context.write(&"blocked".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!writer.is_finished());

        context.abort_async().await;
        writer.await.unwrap().unwrap();
        assert_eq!(context.state(), ConnectionState::Aborted);
    }

    #[tokio::test]
    async fn test_cancellable_write_gives_up_on_backpressure() {
        let protocol = Arc::new(ProtocolWriter::new(Arc::new(NullTerminatedTextProtocol)));
        let (context, _reader) = context_with(protocol, PipeOptions::new(4, 2));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = context
            .write_cancellable(&"blocked".to_string(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, WsPipeError::Canceled));
        assert!(!context.is_aborted());
    }

    #[tokio::test]
    async fn test_cancelled_token_still_publishes_without_backpressure() {
        let (context, mut reader) = text_context();

        let cancel = CancellationToken::new();
        cancel.cancel();
        for _ in 0..32 {
            context
                .write_cancellable(&"sent".to_string(), &cancel)
                .await
                .unwrap();
        }

        let result = reader.read().await.unwrap();
        assert_eq!(result.buffer.to_vec(), b"sent\0".repeat(32));
    }

    #[tokio::test]
    async fn test_concurrent_writes_do_not_interleave() {
        let (context, mut reader) = text_context();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let context = context.clone();
                tokio::spawn(async move { context.write(&format!("message-{i}")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let result = reader.read().await.unwrap();
        let bytes = result.buffer.to_vec();
        let mut messages: Vec<_> = bytes
            .split(|b| *b == 0)
            .filter(|m| !m.is_empty())
            .map(|m| String::from_utf8(m.to_vec()).unwrap())
            .collect();
        messages.sort();
        let mut expected: Vec<_> = (0..16).map(|i| format!("message-{i}")).collect();
        expected.sort();
        assert_eq!(messages, expected);
    }

    #[test]
    fn test_user_downcast() {
        let (writer, _reader) = pipe(PipeOptions::default());
        let (_, input) = pipe(PipeOptions::default());
        let context = ConnectionContext::new(
            "id".to_string(),
            Some(Arc::new(42u32) as User),
            Arc::new(Failing) as Arc<dyn MessageWriter<Message = String>>,
            writer,
            input.handle(),
            CancellationToken::new(),
        );
        assert_eq!(context.user::<u32>(), Some(&42));
        assert_eq!(context.user::<String>(), None);
    }
}
