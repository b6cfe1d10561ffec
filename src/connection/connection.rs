//! A connection's tasks and pipes, and their teardown.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use super::context::{ConnectionContext, User};
use crate::config::ConnectionOptions;
use crate::error::{Result, WsPipeError};
use crate::message::MessageWriter;
use crate::pipe::{DuplexHandles, DuplexPipe, PipeReader};
use crate::transport::{SocketTransport, TransportOutcome, WebSocket};

/// Pipe ends handed to the tasks on activation.
struct PendingPipes {
    application_input: PipeReader,
    transport: DuplexPipe,
}

struct Tasks {
    application: JoinHandle<()>,
    transport: JoinHandle<TransportOutcome>,
}

/// One WebSocket connection: an application task and a transport task joined
/// by a duplex pipe pair.
pub struct WebSocketConnection<Out> {
    context: Arc<ConnectionContext<Out>>,
    transport: Arc<SocketTransport>,
    application_handles: DuplexHandles,
    transport_handles: DuplexHandles,
    /// Stops the transport's receive loop.
    cancellation: CancellationToken,
    closed: CancellationToken,
    pending: parking_lot::Mutex<Option<PendingPipes>>,
    tasks: parking_lot::Mutex<Option<Tasks>>,
    application_done: CancellationToken,
    transport_done: CancellationToken,
    disposed: AtomicBool,
    dispose_completed: CancellationToken,
}

impl<Out: Send + Sync + 'static> WebSocketConnection<Out> {
    pub(crate) fn new(
        id: String,
        user: Option<User>,
        protocol: Arc<dyn MessageWriter<Message = Out>>,
        options: &ConnectionOptions,
    ) -> Self {
        let (application, transport) = DuplexPipe::create_pair(
            options.transport_pipe_options,
            options.application_pipe_options,
        );
        let application_handles = application.handles();
        let transport_handles = transport.handles();
        let (application_input, application_output) = application.into_parts();

        let cancellation = CancellationToken::new();
        let closed = CancellationToken::new();
        let context = ConnectionContext::new(
            id,
            user,
            protocol,
            application_output,
            application_handles.input.clone(),
            closed.clone(),
        );

        Self {
            context: Arc::new(context),
            transport: Arc::new(SocketTransport::new(
                options.web_sockets.clone(),
                cancellation.clone(),
            )),
            application_handles,
            transport_handles,
            cancellation,
            closed,
            pending: parking_lot::Mutex::new(Some(PendingPipes {
                application_input,
                transport,
            })),
            tasks: parking_lot::Mutex::new(None),
            application_done: CancellationToken::new(),
            transport_done: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            dispose_completed: CancellationToken::new(),
        }
    }

    /// Get the connection id.
    #[inline]
    pub fn id(&self) -> &str {
        self.context.id()
    }

    /// Get the application-facing context.
    #[inline]
    pub fn context(&self) -> &Arc<ConnectionContext<Out>> {
        &self.context
    }

    /// Token cancelled once the connection has been torn down.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Start the transport over `socket` and the application produced by
    /// `application`.
    ///
    /// Returns `false` if the connection was already activated.
    pub fn activate<W, F, Fut>(&self, socket: W, application: F) -> bool
    where
        W: WebSocket,
        F: FnOnce(Arc<ConnectionContext<Out>>, PipeReader) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(pending) = self.pending.lock().take() else {
            return false;
        };

        let span = info_span!("connection", connection_id = %self.id());

        let application_done = self.application_done.clone();
        let run = application(self.context.clone(), pending.application_input);
        let application = tokio::spawn(
            async move {
                let _done = application_done.drop_guard();
                run.await;
            }
            .instrument(span.clone()),
        );

        let transport_done = self.transport_done.clone();
        let transport = self.transport.clone();
        let pipe = pending.transport;
        let transport = tokio::spawn(
            async move {
                let _done = transport_done.drop_guard();
                transport.process_socket(socket, pipe).await
            }
            .instrument(span),
        );

        *self.tasks.lock() = Some(Tasks {
            application,
            transport,
        });
        true
    }

    /// Wait until either the application or the transport finished.
    pub async fn wait_for_either(&self) {
        tokio::select! {
            _ = self.application_done.cancelled() => {}
            _ = self.transport_done.cancelled() => {}
        }
    }

    /// Abort the application side and stop receiving from the socket.
    pub fn abort(&self) {
        self.context.abort();
        self.cancellation.cancel();
    }

    /// Forcibly stop all socket I/O.
    pub fn abort_socket(&self) -> bool {
        self.transport.abort_socket()
    }

    /// Tear the connection down.
    ///
    /// Waits for the application and the transport to finish, completing the
    /// pipes of whichever side finished first so the other one observes the
    /// end of its stream. Without `close_gracefully`, pending flushes are
    /// canceled and the receive loop is stopped first. A second caller waits
    /// for the first one's teardown.
    pub async fn dispose(&self, close_gracefully: bool) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            self.dispose_completed.cancelled().await;
            return Ok(());
        }

        debug!(connection_id = %self.id(), "Disposing connection");

        if !close_gracefully {
            self.transport_handles.output.cancel_pending_flush();
            self.cancellation.cancel();
        }

        let tasks = self.tasks.lock().take();
        let result = match tasks {
            Some(tasks) => self.wait_on_tasks(tasks).await,
            None => {
                self.application_handles.complete();
                self.transport_handles.complete();
                self.fire_closed();
                Ok(())
            }
        };

        self.context.mark_disposed();
        self.dispose_completed.cancel();
        result
    }

    async fn wait_on_tasks(&self, tasks: Tasks) -> Result<()> {
        let Tasks {
            mut application,
            mut transport,
        } = tasks;

        tokio::select! {
            joined = &mut application => {
                // The application is done with the pipe towards the transport.
                self.application_handles.complete();

                debug!(connection_id = %self.id(), "Waiting for transport");
                let transport_joined = transport.await;
                debug!(connection_id = %self.id(), "Transport complete");

                self.transport_handles.complete();
                self.context.wait_for_writes().await;
                self.fire_closed();

                joined.map_err(WsPipeError::application)?;
                transport_joined.map_err(WsPipeError::application)?;
            }
            joined = &mut transport => {
                // The transport is done with the pipe towards the application.
                self.transport_handles.complete();
                self.fire_closed();

                debug!(connection_id = %self.id(), "Waiting for application");
                let application_joined = application.await;
                debug!(connection_id = %self.id(), "Application complete");

                self.application_handles.complete();
                self.context.wait_for_writes().await;

                joined.map_err(WsPipeError::application)?;
                application_joined.map_err(WsPipeError::application)?;
            }
        }

        Ok(())
    }

    fn fire_closed(&self) {
        self.closed.cancel();
        self.context.abort();
    }
}

impl<Out: Send + Sync + 'static> fmt::Debug for WebSocketConnection<Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.id())
            .field("state", &self.context.state())
            .field("disposed", &self.disposed.load(Ordering::Acquire))
            .finish()
    }
}
