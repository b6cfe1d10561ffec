//! Bridges a socket to the transport side of a duplex pipe.
//!
//! Two loops run concurrently:
//! - receive: socket fragments go into the pipe towards the application,
//!   wrapped in frames when frame packets are enabled
//! - send: bytes written by the application go out on the socket, split back
//!   into the original fragments when frame packets are enabled
//!
//! Whichever loop finishes first gives the other one `close_timeout` to follow
//! before the socket is aborted.
//!
//! With a keep-alive interval the send loop also pings the peer. If a
//! keep-alive timeout is set and nothing arrives within it after a ping, the
//! receive loop aborts the socket.

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::socket::{
    CloseStatus, SocketEvent, SocketMessageType, SocketReceiver, SocketSender, WebSocket,
};
use crate::config::WebSocketOptions;
use crate::error::WsPipeError;
use crate::pipe::{DuplexPipe, PipeReader, PipeWriter};
use crate::protocol::{BufferWriter, ByteSequence, FrameReader, FrameWriter};

/// How a call to [`SocketTransport::process_socket`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportOutcome {
    /// The peer sent a close frame.
    pub graceful_close: bool,
    /// The socket had to be aborted after a close timeout.
    pub aborted: bool,
}

/// Why the send loop stopped early.
enum SendStop {
    /// Socket no longer accepts data or was aborted.
    Closed,
    /// The outbound byte stream is not valid framing.
    Framing(WsPipeError),
    /// The socket send itself failed.
    Socket(WsPipeError),
}

/// Runs the receive and send loops for one socket.
#[derive(Debug)]
pub struct SocketTransport {
    options: WebSocketOptions,
    /// External cancellation, observed by the receive loop.
    cancellation: CancellationToken,
    /// Forcible abort of all socket I/O.
    abort: CancellationToken,
    aborted: AtomicBool,
    /// When the unanswered keep-alive ping was sent.
    awaiting_pong: Mutex<Option<Instant>>,
    ping_sent: Notify,
}

impl SocketTransport {
    /// Create a transport driven by `options` and stopped by `cancellation`.
    pub fn new(options: WebSocketOptions, cancellation: CancellationToken) -> Self {
        Self {
            options,
            cancellation,
            abort: CancellationToken::new(),
            aborted: AtomicBool::new(false),
            awaiting_pong: Mutex::new(None),
            ping_sent: Notify::new(),
        }
    }

    /// Token cancelled when the socket is aborted.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Check if the socket was aborted.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Forcibly stop all socket I/O. Only the first call has an effect.
    ///
    /// Returns `true` for the call that performed the abort.
    pub fn abort_socket(&self) -> bool {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return false;
        }
        warn!("Aborting socket");
        self.abort.cancel();
        true
    }

    /// Run both loops over `socket` until they finish or the close timeout
    /// forces an abort.
    pub async fn process_socket<W: WebSocket>(
        &self,
        socket: W,
        transport: DuplexPipe,
    ) -> TransportOutcome {
        let (receiver, sender) = socket.split();
        let input_handle = transport.input.handle();
        let output_handle = transport.output.handle();
        let (input, output) = transport.into_parts();

        let receiving = self.receive_loop(receiver, output);
        let sending = self.send_loop(sender, input);
        tokio::pin!(receiving, sending);

        let close_timeout = self.options.close_timeout;

        let graceful_close = tokio::select! {
            graceful = &mut receiving => {
                debug!("Waiting for send to finish");

                // Let the send loop's pending read yield.
                input_handle.cancel_pending_read();

                if tokio::time::timeout(close_timeout, &mut sending).await.is_err() {
                    warn!(?close_timeout, "Send did not finish in time");
                    self.abort_socket();
                    sending.await;
                }
                graceful
            }
            () = &mut sending => {
                debug!("Waiting for close");

                match tokio::time::timeout(close_timeout, &mut receiving).await {
                    Ok(graceful) => graceful,
                    Err(_) => {
                        warn!(?close_timeout, "Close handshake timed out");
                        self.abort_socket();
                        output_handle.cancel_pending_flush();
                        receiving.await
                    }
                }
            }
        };

        TransportOutcome {
            graceful_close,
            aborted: self.is_aborted(),
        }
    }

    /// Receive loop. Returns whether the peer closed gracefully.
    async fn receive_loop<R: SocketReceiver>(
        &self,
        mut receiver: R,
        mut output: PipeWriter,
    ) -> bool {
        let mut graceful = false;
        let mut failure = None;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break,
                _ = self.abort.cancelled() => break,
                _ = self.keep_alive_expired() => {
                    warn!("Keep-alive timed out");
                    self.abort_socket();
                    break;
                }
                event = receiver.receive() => event,
            };

            if event.is_ok() {
                self.peer_seen();
            }

            match event {
                Ok(SocketEvent::Close { code }) => {
                    debug!(?code, "Peer sent close frame");
                    graceful = true;
                    break;
                }
                Ok(SocketEvent::Data {
                    payload,
                    message_type,
                    end_of_message,
                }) => {
                    trace!(
                        ?message_type,
                        size = payload.len(),
                        end_of_message,
                        "Message received"
                    );
                    self.write_fragment(&mut output, &payload, end_of_message);

                    let result = tokio::select! {
                        biased;
                        _ = self.cancellation.cancelled() => break,
                        _ = self.abort.cancelled() => break,
                        result = output.flush() => result,
                    };

                    // Canceled while applying backpressure, or the consumer is done.
                    if result.is_canceled || result.is_completed {
                        break;
                    }

                    // Nothing was read while waiting on the application.
                    self.peer_seen();
                }
                Ok(SocketEvent::Ping) => trace!("Ping received"),
                Ok(SocketEvent::Pong) => trace!("Pong received"),
                // Ends the stream like a close frame would, without an error.
                Err(WsPipeError::ConnectionClosed) => {
                    debug!("Socket closed prematurely");
                    break;
                }
                Err(e) => {
                    if !self.is_aborted() && !self.cancellation.is_cancelled() {
                        debug!(error = %e, "Socket receive failed");
                        failure = Some(e);
                    }
                    break;
                }
            }
        }

        output.complete(failure);
        graceful
    }

    fn peer_seen(&self) {
        *self.awaiting_pong.lock() = None;
    }

    /// Completes once a ping went unanswered for the keep-alive timeout.
    async fn keep_alive_expired(&self) {
        let timeout = match (self.options.keep_alive_interval, self.options.keep_alive_timeout) {
            (Some(_), Some(timeout)) => timeout,
            _ => return future::pending().await,
        };

        loop {
            let notified = self.ping_sent.notified();
            let sent = *self.awaiting_pong.lock();
            match sent {
                Some(sent) => tokio::select! {
                    _ = time::sleep_until(sent + timeout) => {
                        if *self.awaiting_pong.lock() == Some(sent) {
                            return;
                        }
                    }
                    _ = notified => {}
                },
                None => notified.await,
            }
        }
    }

    fn keep_alive_ticker(&self) -> Option<Interval> {
        let period = self
            .options
            .keep_alive_interval
            .filter(|period| *period > Duration::ZERO)?;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(ticker)
    }

    async fn send_ping<S: SocketSender>(&self, sender: &mut S) {
        if !sender.can_send() || self.is_aborted() {
            return;
        }

        {
            let mut awaiting = self.awaiting_pong.lock();
            if awaiting.is_none() {
                *awaiting = Some(Instant::now());
                self.ping_sent.notify_waiters();
            }
        }

        trace!("Sending ping");
        let sent = tokio::select! {
            biased;
            _ = self.abort.cancelled() => Ok(()),
            sent = sender.ping() => sent,
        };
        if let Err(e) = sent {
            debug!(error = %e, "Ping failed");
        }
    }

    fn write_fragment(&self, output: &mut PipeWriter, payload: &[u8], end_of_message: bool) {
        if !self.options.frame_packets() {
            output.write(payload);
            return;
        }

        let mut frames = FrameWriter::new(output);
        if payload.is_empty() {
            frames.advance(0);
        } else {
            frames.write(payload);
        }
        frames.finish_last_frame(end_of_message);
    }

    /// Send loop.
    async fn send_loop<S: SocketSender>(&self, mut sender: S, mut input: PipeReader) {
        let message_type = SocketMessageType::from(self.options.transfer_format);
        let reader = FrameReader::with_max_frame_size(self.options.max_frame_size);
        let mut keep_alive = self.keep_alive_ticker();
        let mut failure = None;

        loop {
            let result = tokio::select! {
                biased;
                _ = self.abort.cancelled() => break,
                _ = next_tick(&mut keep_alive) => {
                    self.send_ping(&mut sender).await;
                    continue;
                }
                result = input.read() => result,
            };
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            if result.is_canceled {
                break;
            }

            let mut buffer = result.buffer;
            let total = buffer.len();
            let sent = if total == 0 {
                Ok(())
            } else {
                trace!(size = total, "Sending payload");
                if self.options.frame_packets() {
                    self.send_frames(&mut sender, &reader, &mut buffer, message_type)
                        .await
                } else {
                    let payload = buffer.to_bytes();
                    let _ = buffer.split_to(total);
                    self.send_fragment(&mut sender, payload, message_type, true)
                        .await
                }
            };
            input.advance_to(total - buffer.len(), total);

            match sent {
                Ok(()) => {}
                Err(SendStop::Closed) => break,
                Err(SendStop::Framing(e)) => {
                    failure = Some(e);
                    break;
                }
                Err(SendStop::Socket(e)) => {
                    if !self.is_aborted() {
                        error!(error = %e, "Error writing frame");
                    }
                    break;
                }
            }

            if result.is_completed {
                break;
            }
        }

        if sender.can_send() && !self.is_aborted() {
            let status = if failure.is_some() {
                CloseStatus::InternalError
            } else {
                CloseStatus::Normal
            };
            let closed = tokio::select! {
                biased;
                _ = self.abort.cancelled() => Ok(()),
                closed = sender.close(status) => closed,
            };
            if let Err(e) = closed {
                debug!(error = %e, "Closing socket failed");
            }
        }

        input.complete();

        if let Some(e) = failure {
            error!(error = %e, "Send loop errored");
        }
    }

    async fn send_frames<S: SocketSender>(
        &self,
        sender: &mut S,
        reader: &FrameReader,
        buffer: &mut ByteSequence,
        message_type: SocketMessageType,
    ) -> Result<(), SendStop> {
        while let Some(frame) = reader.read_frame(buffer).map_err(SendStop::Framing)? {
            let payload = frame.payload_bytes();
            self.send_fragment(sender, payload, message_type, frame.end_of_message)
                .await?;
        }
        Ok(())
    }

    async fn send_fragment<S: SocketSender>(
        &self,
        sender: &mut S,
        payload: Bytes,
        message_type: SocketMessageType,
        end_of_message: bool,
    ) -> Result<(), SendStop> {
        if !sender.can_send() {
            return Err(SendStop::Closed);
        }

        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(SendStop::Closed),
            sent = sender.send(payload, message_type, end_of_message) => sent.map_err(SendStop::Socket),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::{PipeOptions, TransferFormat};
    use crate::protocol::build_message;
    use crate::transport::{memory_socket_pair, memory_socket_pair_with_capacity};

    fn framed_options() -> WebSocketOptions {
        WebSocketOptions {
            frame_packets: true,
            ..WebSocketOptions::default()
        }
    }

    #[tokio::test]
    async fn test_fragments_become_frames() {
        let (client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (mut app_input, _app_output) = application.into_parts();

        let adapter = Arc::new(SocketTransport::new(framed_options(), CancellationToken::new()));
        let task = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.process_socket(server, transport).await })
        };

        let (_client_rx, mut client_tx) = client.split();
        client_tx
            .send(Bytes::from_static(b"Pi"), SocketMessageType::Text, false)
            .await
            .unwrap();
        client_tx
            .send(Bytes::from_static(b"ng"), SocketMessageType::Text, true)
            .await
            .unwrap();

        let expected = build_message([&b"Pi"[..], &b"ng"[..]]);
        let mut seen = Vec::new();
        while seen.len() < expected.len() {
            let result = app_input.read().await.unwrap();
            seen = result.buffer.to_vec();
            app_input.advance_to(0, result.buffer.len());
        }
        assert_eq!(seen, expected);

        client_tx.close(CloseStatus::Normal).await.unwrap();
        drop(app_input);
        let outcome = task.await.unwrap();
        assert!(outcome.graceful_close);
    }

    #[tokio::test]
    async fn test_frames_become_fragments() {
        let (client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (_app_input, mut app_output) = application.into_parts();

        let mut options = framed_options();
        options.transfer_format = TransferFormat::Binary;
        let adapter = SocketTransport::new(options, CancellationToken::new());
        let task = tokio::spawn(async move { adapter.process_socket(server, transport).await });

        app_output.write(&build_message([&b"Pi"[..], &b"ng"[..]]));
        app_output.flush().await;

        let (mut client_rx, client_tx) = client.split();
        for (payload, end) in [(&b"Pi"[..], false), (&b"ng"[..], true)] {
            assert_eq!(
                client_rx.receive().await.unwrap(),
                SocketEvent::Data {
                    payload: Bytes::copy_from_slice(payload),
                    message_type: SocketMessageType::Binary,
                    end_of_message: end,
                }
            );
        }

        // Application finishing closes the socket normally.
        app_output.complete(None);
        assert_eq!(
            client_rx.receive().await.unwrap(),
            SocketEvent::Close { code: Some(1000) }
        );
        drop(client_tx);
        let outcome = task.await.unwrap();
        assert!(!outcome.aborted);
    }

    #[tokio::test]
    async fn test_unframed_sends_whole_buffer() {
        let (client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (_app_input, mut app_output) = application.into_parts();

        let adapter = SocketTransport::new(WebSocketOptions::default(), CancellationToken::new());
        let _task = tokio::spawn(async move { adapter.process_socket(server, transport).await });

        app_output.write(b"ping\0");
        app_output.flush().await;

        let (mut client_rx, _client_tx) = client.split();
        assert_eq!(
            client_rx.receive().await.unwrap(),
            SocketEvent::Data {
                payload: Bytes::from_static(b"ping\0"),
                message_type: SocketMessageType::Text,
                end_of_message: true,
            }
        );
    }

    #[tokio::test]
    async fn test_premature_close_completes_without_error() {
        let (client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (mut app_input, _app_output) = application.into_parts();

        let adapter = SocketTransport::new(framed_options(), CancellationToken::new());
        let task = tokio::spawn(async move { adapter.process_socket(server, transport).await });

        drop(client);
        let result = app_input.read().await.unwrap();
        assert!(result.is_completed);
        assert!(result.buffer.is_empty());

        let outcome = task.await.unwrap();
        assert!(!outcome.graceful_close);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_is_aborted_after_close_timeout() {
        let (client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (_app_input, mut app_output) = application.into_parts();

        let mut options = framed_options();
        options.close_timeout = Duration::from_secs(5);
        let adapter = Arc::new(SocketTransport::new(options, CancellationToken::new()));
        let task = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.process_socket(server, transport).await })
        };

        // The application is done; the peer never answers the close.
        app_output.complete(None);
        let started = tokio::time::Instant::now();
        let outcome = task.await.unwrap();

        assert!(outcome.aborted);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
        assert!(!adapter.abort_socket());
        drop(client);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_send_is_aborted_after_close_timeout() {
        // Capacity 1 and a peer that never reads: sends block.
        let (client, server) = memory_socket_pair_with_capacity(1);
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (_app_input, mut app_output) = application.into_parts();

        let adapter = SocketTransport::new(framed_options(), CancellationToken::new());
        let task = tokio::spawn(async move { adapter.process_socket(server, transport).await });

        let (client_rx, mut client_tx) = client.split();
        for _ in 0..4 {
            app_output.write(&build_message([&b"data"[..]]));
            app_output.flush().await;
        }
        tokio::task::yield_now().await;

        // Peer closes; the send loop is blocked on a full socket.
        client_tx.close(CloseStatus::Normal).await.unwrap();
        let started = tokio::time::Instant::now();
        let outcome = task.await.unwrap();

        assert!(outcome.graceful_close);
        assert!(outcome.aborted);
        assert!(started.elapsed() < Duration::from_secs(6));
        drop(client_rx);
    }

    fn keep_alive_options() -> WebSocketOptions {
        WebSocketOptions {
            keep_alive_interval: Some(Duration::from_secs(10)),
            keep_alive_timeout: Some(Duration::from_secs(5)),
            ..framed_options()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_ping_aborts_socket() {
        let (client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (mut app_input, _app_output) = application.into_parts();

        let adapter = Arc::new(SocketTransport::new(keep_alive_options(), CancellationToken::new()));
        let started = tokio::time::Instant::now();
        let task = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.process_socket(server, transport).await })
        };

        // The peer sees the ping but never answers.
        let (mut client_rx, _client_tx) = client.split();
        assert_eq!(client_rx.receive().await.unwrap(), SocketEvent::Ping);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(11));

        let outcome = task.await.unwrap();
        assert!(outcome.aborted);
        assert!(!outcome.graceful_close);
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(started.elapsed() < Duration::from_secs(16));

        let result = app_input.read().await.unwrap();
        assert!(result.is_completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_pings_keep_socket_open() {
        let (client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (_app_input, _app_output) = application.into_parts();

        let cancellation = CancellationToken::new();
        let adapter = Arc::new(SocketTransport::new(keep_alive_options(), cancellation.clone()));
        let task = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.process_socket(server, transport).await })
        };

        let (mut client_rx, mut client_tx) = client.split();
        let pongs = tokio::spawn(async move {
            let mut answered = 0;
            while let Ok(event) = client_rx.receive().await {
                if event == SocketEvent::Ping {
                    if client_tx.pong().await.is_err() {
                        break;
                    }
                    answered += 1;
                }
            }
            answered
        });

        tokio::time::sleep(Duration::from_secs(55)).await;
        assert!(!adapter.is_aborted());

        cancellation.cancel();
        let outcome = task.await.unwrap();
        assert!(!outcome.aborted);
        assert!(pongs.await.unwrap() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_answers_ping() {
        let (client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (mut app_input, _app_output) = application.into_parts();

        let adapter = Arc::new(SocketTransport::new(keep_alive_options(), CancellationToken::new()));
        let _task = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.process_socket(server, transport).await })
        };

        // A data message after each ping counts as an answer.
        let (mut client_rx, mut client_tx) = client.split();
        for _ in 0..3 {
            assert_eq!(client_rx.receive().await.unwrap(), SocketEvent::Ping);
            client_tx
                .send(Bytes::from_static(b"x"), SocketMessageType::Text, true)
                .await
                .unwrap();
            let result = app_input.read().await.unwrap();
            let len = result.buffer.len();
            app_input.advance_to(len, len);
        }
        assert!(!adapter.is_aborted());
    }

    #[tokio::test]
    async fn test_cancellation_stops_receive() {
        let (_client, server) = memory_socket_pair();
        let (application, transport) =
            DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        let (mut app_input, _app_output) = application.into_parts();

        let cancellation = CancellationToken::new();
        let adapter = SocketTransport::new(framed_options(), cancellation.clone());
        let _task = tokio::spawn(async move { adapter.process_socket(server, transport).await });

        cancellation.cancel();
        let result = app_input.read().await.unwrap();
        assert!(result.is_completed);
    }
}
