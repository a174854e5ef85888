#![forbid(unsafe_code)]
//! Bounded background reader for line-oriented sockets and pipes.
//!
//! A worker thread pulls chunks from a [`ByteSource`] into a [`LineBuffer`] while consumers
//! retrieve whole lines or single bytes with blocking calls. The crate provides:
//! - [`BoundedAsyncReader`]: the worker, with byte/line ceilings and backpressure.
//! - [`LineClient`]: send/receive facade over an already-connected duplex stream.
//! - [`AsyncLineReader`] (feature `tokio`): the same contract for tokio consumers.
//!
//! A source failure (including end of stream) is latched: consumers first drain whatever was
//! buffered, then every call reports the same failure until the reader is stopped.

mod client;
mod config;
mod error;
mod line_buffer;
mod reader;
mod source;
mod wakeup;

#[cfg(feature = "tokio")]
mod tokio_reader;

pub use client::LineClient;
pub use config::{
    ReaderConfig, ReaderConfigBuilder, ReaderLimits, DEFAULT_MAX_BUFFERED_BYTES,
    DEFAULT_MAX_BUFFERED_LINES, DEFAULT_WORKER_NAME,
};
pub use error::{AttachError, ClientError, LineBufferError, ReaderError, SourceFailure};
pub use line_buffer::LineBuffer;
pub use reader::{BoundedAsyncReader, ReaderState};
pub use source::{ByteSource, FdSource, ReadMode, STREAM_CHUNK_BYTES};
pub use wakeup::{Readiness, ReadinessWait, WakeupSignal};

#[cfg(feature = "tokio")]
pub use tokio_reader::AsyncLineReader;
