//! Paired pipes joining a socket transport to an application.

use super::channel::{pipe, PipeHandle, PipeReader, PipeWriter};
use crate::config::PipeOptions;

/// One side of a duplex connection: something to read from and something
/// to write to.
#[derive(Debug)]
pub struct DuplexPipe {
    /// Bytes coming from the other side.
    pub input: PipeReader,
    /// Bytes going to the other side.
    pub output: PipeWriter,
}

impl DuplexPipe {
    /// Create two cross-wired sides, returned as `(application, transport)`.
    ///
    /// Bytes the transport writes are read by the application through a pipe
    /// using `transport_options`; bytes the application writes reach the
    /// transport through a pipe using `application_options`.
    pub fn create_pair(
        transport_options: PipeOptions,
        application_options: PipeOptions,
    ) -> (DuplexPipe, DuplexPipe) {
        let (transport_writer, application_reader) = pipe(transport_options);
        let (application_writer, transport_reader) = pipe(application_options);

        let application = DuplexPipe {
            input: application_reader,
            output: application_writer,
        };
        let transport = DuplexPipe {
            input: transport_reader,
            output: transport_writer,
        };
        (application, transport)
    }

    /// Control handles for `(input, output)`.
    pub fn handles(&self) -> DuplexHandles {
        DuplexHandles {
            input: self.input.handle(),
            output: self.output.handle(),
        }
    }

    /// Split into reader and writer.
    pub fn into_parts(self) -> (PipeReader, PipeWriter) {
        (self.input, self.output)
    }
}

/// Control handles for both directions of one [`DuplexPipe`].
#[derive(Debug, Clone)]
pub struct DuplexHandles {
    /// Handle of the side's input pipe.
    pub input: PipeHandle,
    /// Handle of the side's output pipe.
    pub output: PipeHandle,
}

impl DuplexHandles {
    /// Complete both directions as seen from this side.
    pub fn complete(&self) {
        self.input.complete_reader();
        self.output.complete_writer(None);
    }
}
