//! One direction of a duplex pipe.
//!
//! A [`PipeWriter`] stages bytes through the [`BufferWriter`] interface and
//! publishes them with [`PipeWriter::flush`]. A [`PipeReader`] sees every
//! published byte as a [`ByteSequence`] and releases what it consumed with
//! [`PipeReader::advance_to`].
//!
//! # Example
//!
//! ```
//! use wspipe::config::PipeOptions;
//! use wspipe::pipe::pipe;
//! use wspipe::protocol::BufferWriter;
//!
//! # tokio_test_block_on(async {
//! let (mut writer, mut reader) = pipe(PipeOptions::default());
//! writer.write(b"hello");
//! writer.flush().await;
//!
//! let result = reader.read().await.unwrap();
//! assert_eq!(result.buffer.to_vec(), b"hello");
//! reader.advance_to(result.buffer.len(), result.buffer.len());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use super::backpressure::BackpressureController;
use crate::config::PipeOptions;
use crate::error::{Result, WsPipeError};
use crate::protocol::{BufferWriter, ByteSequence, Scratch};

/// Outcome of [`PipeWriter::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushResult {
    /// The flush was released by `cancel_pending_flush`.
    pub is_canceled: bool,
    /// The reader completed; further writes are discarded.
    pub is_completed: bool,
}

/// Outcome of [`PipeReader::read`].
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    /// Every unconsumed byte, oldest first.
    pub buffer: ByteSequence,
    /// The read was released by `cancel_pending_read`.
    pub is_canceled: bool,
    /// The writer completed; no more bytes will arrive.
    pub is_completed: bool,
}

#[derive(Default)]
struct State {
    buffer: ByteSequence,
    /// Bytes at the front of `buffer` the reader already looked at.
    examined: usize,
    writer_completed: bool,
    writer_error: Option<WsPipeError>,
    reader_completed: bool,
    read_canceled: bool,
    flush_canceled: bool,
}

struct Shared {
    state: Mutex<State>,
    backpressure: BackpressureController,
    reader_wake: Notify,
    writer_wake: Notify,
}

impl Shared {
    fn complete_writer(&self, error: Option<WsPipeError>) {
        {
            let mut state = self.state.lock();
            if state.writer_completed {
                return;
            }
            state.writer_completed = true;
            state.writer_error = error;
        }
        trace!("Pipe writer completed");
        self.reader_wake.notify_one();
    }

    fn complete_reader(&self) {
        {
            let mut state = self.state.lock();
            if state.reader_completed {
                return;
            }
            state.reader_completed = true;
            state.buffer = ByteSequence::new();
            state.examined = 0;
        }
        self.backpressure.reset();
        trace!("Pipe reader completed");
        self.writer_wake.notify_one();
    }

    fn cancel_pending_read(&self) {
        self.state.lock().read_canceled = true;
        self.reader_wake.notify_one();
    }

    fn cancel_pending_flush(&self) {
        self.state.lock().flush_canceled = true;
        self.writer_wake.notify_one();
    }
}

/// Create one pipe direction with the given watermarks.
pub fn pipe(options: PipeOptions) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        backpressure: BackpressureController::new(options),
        reader_wake: Notify::new(),
        writer_wake: Notify::new(),
    });

    (
        PipeWriter {
            shared: shared.clone(),
            scratch: Scratch::default(),
        },
        PipeReader { shared },
    )
}

/// Cloneable control handle for a pipe direction.
///
/// Lets code that does not own the reader or writer cancel pending
/// operations or complete either end.
#[derive(Clone)]
pub struct PipeHandle {
    shared: Arc<Shared>,
}

impl PipeHandle {
    /// Release a pending (or the next) `read` with `is_canceled` set.
    pub fn cancel_pending_read(&self) {
        self.shared.cancel_pending_read();
    }

    /// Release a pending (or the next) `flush` with `is_canceled` set.
    pub fn cancel_pending_flush(&self) {
        self.shared.cancel_pending_flush();
    }

    /// Complete the writing end, optionally with an error for the reader.
    pub fn complete_writer(&self, error: Option<WsPipeError>) {
        self.shared.complete_writer(error);
    }

    /// Complete the reading end; pending and future flushes report completion.
    pub fn complete_reader(&self) {
        self.shared.complete_reader();
    }

    /// Check if the writing end has completed.
    pub fn is_writer_completed(&self) -> bool {
        self.shared.state.lock().writer_completed
    }

    /// Check if the reading end has completed.
    pub fn is_reader_completed(&self) -> bool {
        self.shared.state.lock().reader_completed
    }

    /// Bytes flushed but not yet consumed.
    pub fn unconsumed_bytes(&self) -> usize {
        self.shared.backpressure.unconsumed()
    }
}

impl fmt::Debug for PipeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeHandle")
            .field("unconsumed", &self.unconsumed_bytes())
            .finish()
    }
}

/// Producing end of a pipe.
///
/// Dropping the writer completes it without an error.
pub struct PipeWriter {
    shared: Arc<Shared>,
    scratch: Scratch,
}

impl PipeWriter {
    /// Get a control handle for this pipe.
    pub fn handle(&self) -> PipeHandle {
        PipeHandle {
            shared: self.shared.clone(),
        }
    }

    /// Bytes committed with `advance` but not flushed yet.
    #[inline]
    pub fn unflushed_len(&self) -> usize {
        self.scratch.committed()
    }

    /// Publish committed bytes to the reader.
    ///
    /// Suspends while the reader is behind by at least the pause watermark,
    /// until it drains below the resume watermark, the flush is canceled or
    /// the reader completes.
    pub async fn flush(&mut self) -> FlushResult {
        let bytes = self.scratch.take();
        let published = bytes.len();

        {
            let mut state = self.shared.state.lock();
            if state.reader_completed || state.writer_completed {
                let is_canceled = std::mem::take(&mut state.flush_canceled);
                return FlushResult {
                    is_canceled,
                    is_completed: true,
                };
            }
            if published > 0 {
                state.buffer.push(bytes);
                self.shared.backpressure.add(published);
            }
        }

        if published > 0 {
            self.shared.reader_wake.notify_one();
        }

        loop {
            {
                let mut state = self.shared.state.lock();
                if state.flush_canceled {
                    state.flush_canceled = false;
                    return FlushResult {
                        is_canceled: true,
                        is_completed: state.reader_completed,
                    };
                }
                if state.reader_completed {
                    return FlushResult {
                        is_canceled: false,
                        is_completed: true,
                    };
                }
                if !self.shared.backpressure.is_paused() {
                    return FlushResult::default();
                }
            }

            trace!(
                unconsumed = self.shared.backpressure.unconsumed(),
                "Flush waiting for reader"
            );
            self.shared.writer_wake.notified().await;
        }
    }

    /// Complete the writer, optionally passing an error to the reader.
    pub fn complete(&mut self, error: Option<WsPipeError>) {
        self.shared.complete_writer(error);
    }
}

impl BufferWriter for PipeWriter {
    fn get_buffer(&mut self, size_hint: usize) -> &mut [u8] {
        self.scratch.get_buffer(size_hint)
    }

    fn advance(&mut self, count: usize) {
        self.scratch.advance(count)
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.complete_writer(None);
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter")
            .field("unflushed", &self.scratch.committed())
            .finish()
    }
}

/// Consuming end of a pipe.
///
/// Dropping the reader completes it.
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Get a control handle for this pipe.
    pub fn handle(&self) -> PipeHandle {
        PipeHandle {
            shared: self.shared.clone(),
        }
    }

    /// Wait for bytes beyond what was last examined, completion or cancellation.
    ///
    /// If the writer completed with an error, that error is returned once.
    pub async fn read(&mut self) -> Result<ReadResult> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if let Some(error) = state.writer_error.take() {
                    return Err(error);
                }

                if state.read_canceled {
                    state.read_canceled = false;
                    return Ok(ReadResult {
                        buffer: state.buffer.clone(),
                        is_canceled: true,
                        is_completed: state.writer_completed,
                    });
                }

                if state.buffer.len() > state.examined
                    || state.writer_completed
                    || state.reader_completed
                {
                    return Ok(ReadResult {
                        buffer: state.buffer.clone(),
                        is_canceled: false,
                        is_completed: state.writer_completed || state.reader_completed,
                    });
                }
            }

            self.shared.reader_wake.notified().await;
        }
    }

    /// Release `consumed` bytes and mark `examined` bytes as seen.
    ///
    /// Both counts are relative to the start of the last read buffer. When
    /// everything left was examined the next `read` waits for new bytes.
    pub fn advance_to(&mut self, consumed: usize, examined: usize) {
        let released = {
            let mut state = self.shared.state.lock();
            let consumed = consumed.min(state.buffer.len());
            let _ = state.buffer.split_to(consumed);
            state.examined = examined
                .max(consumed)
                .saturating_sub(consumed)
                .min(state.buffer.len());
            consumed
        };

        if self.shared.backpressure.release(released) {
            trace!("Pipe reader drained below resume watermark");
            self.shared.writer_wake.notify_one();
        }
    }

    /// Release `consumed` bytes, treating only those as examined.
    pub fn advance(&mut self, consumed: usize) {
        self.advance_to(consumed, consumed);
    }

    /// Complete the reader.
    pub fn complete(&mut self) {
        self.shared.complete_reader();
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.complete_reader();
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("unconsumed", &self.shared.backpressure.unconsumed())
            .finish()
    }
}
