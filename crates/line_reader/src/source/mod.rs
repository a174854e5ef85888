mod fd;

use std::{io, os::fd::BorrowedFd};

pub use fd::{FdSource, ReadMode, STREAM_CHUNK_BYTES};

/// Readable entity the background worker pulls from.
///
/// Only the worker thread ever calls into a source once it has been handed to a reader.
pub trait ByteSource: Send + 'static {
    /// Non-blocking check for pending data, end of stream, or a pending error.
    fn is_ready_for_reading(&self) -> io::Result<bool>;

    /// Reads one chunk. An empty chunk means the source has no more data.
    fn read(&mut self) -> io::Result<Vec<u8>>;

    /// Descriptor registered in the worker's readiness wait next to its wakeup signal.
    fn readiness_fd(&self) -> BorrowedFd<'_>;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn is_ready_for_reading(&self) -> io::Result<bool> {
        (**self).is_ready_for_reading()
    }

    fn read(&mut self) -> io::Result<Vec<u8>> {
        (**self).read()
    }

    fn readiness_fd(&self) -> BorrowedFd<'_> {
        (**self).readiness_fd()
    }
}
