use std::io;

use thiserror::Error;

/// Misuse of the low-level [`LineBuffer`](crate::LineBuffer) API.
///
/// The reader never produces these: it always waits on the matching count first.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum LineBufferError {
    #[error("get_char called on an empty buffer")]
    BufferEmpty,
    #[error("get_line called on a buffer with no complete line")]
    NoCompleteLine,
}

/// Terminal failure of the worker, latched until the reader is stopped.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SourceFailure {
    #[error("there is no more data to read")]
    EndOfStream,
    #[error("failed reading source: {message}")]
    Read { kind: io::ErrorKind, message: String },
    #[error("failed waiting for source readiness: {message}")]
    Wait { kind: io::ErrorKind, message: String },
}

impl SourceFailure {
    pub(crate) fn read(err: &io::Error) -> Self {
        Self::Read {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub(crate) fn wait(err: &io::Error) -> Self {
        Self::Wait {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("start called but the reader is already running")]
    AlreadyRunning,
    #[error("reader is not running")]
    NotRunning,
    #[error("invalid reader configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to set up readiness wait: {0}")]
    Setup(#[source] io::Error),
    #[error("failed to spawn reader worker: {0}")]
    Spawn(#[source] io::Error),
    #[error("reader worker panicked")]
    WorkerPanicked,
    #[error(transparent)]
    Source(#[from] SourceFailure),
    #[error(transparent)]
    Buffer(#[from] LineBufferError),
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("send called on a disconnected client")]
    NotConnected,
    #[error("failed to duplicate connection descriptor: {0}")]
    Duplicate(#[source] io::Error),
    #[error("failed writing to connection: {0}")]
    Write(#[source] io::Error),
    #[error(transparent)]
    Reader(#[from] ReaderError),
}

/// Failed [`LineClient::attach`](crate::LineClient::attach); the stream is handed back.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct AttachError<W> {
    #[source]
    pub error: ClientError,
    pub stream: W,
}

impl<W> AttachError<W> {
    pub fn into_parts(self) -> (ClientError, W) {
        (self.error, self.stream)
    }
}
