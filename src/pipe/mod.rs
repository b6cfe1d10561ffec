//! In-memory byte pipes with backpressure.
//!
//! A [`DuplexPipe`] pair joins the socket transport and the application:
//! - each direction is a single-producer, single-consumer byte pipe
//! - flushing suspends while the consumer lags behind the pause watermark
//! - completion (optionally with an error) propagates to the paired end

mod backpressure;
mod channel;
mod duplex;

pub use channel::{pipe, FlushResult, PipeHandle, PipeReader, PipeWriter, ReadResult};
pub use duplex::{DuplexHandles, DuplexPipe};
