//! Tokio flavour of the bounded reader.
//!
//! Same contract as [`BoundedAsyncReader`](crate::BoundedAsyncReader): both-ceilings
//! backpressure, a latched terminal error that surfaces only after the buffer drains, and a
//! hard reset on `stop()`. The worker is a spawned task; a `watch` channel cancels it and two
//! [`Notify`]s replace the condition variables.

use std::{
    io, mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    runtime::Handle,
    sync::{watch, Notify},
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, instrument::WithSubscriber, trace, warn, Instrument, Span};

use crate::{
    config::{ReaderConfig, ReaderLimits},
    error::{ReaderError, SourceFailure},
    line_buffer::LineBuffer,
    reader::{Inner, ReaderState},
    source::STREAM_CHUNK_BYTES,
};

#[derive(Debug)]
struct AsyncShared {
    limits: ReaderLimits,
    inner: Mutex<Inner>,
    data_ready: Notify,
    capacity_freed: Notify,
}

impl AsyncShared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct TaskHandle {
    task: JoinHandle<()>,
    cancel: watch::Sender<bool>,
}

#[derive(Debug, Default)]
enum TaskSlot {
    #[default]
    Empty,
    Attached(TaskHandle),
    /// `stop()` took the task and has not reset the reader yet.
    Stopping,
}

#[derive(Debug)]
pub struct AsyncLineReader {
    worker_name: String,
    span: Span,
    shared: Arc<AsyncShared>,
    task: Mutex<TaskSlot>,
}

impl Default for AsyncLineReader {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}

impl AsyncLineReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            worker_name: config.worker_name,
            span: config.span,
            shared: Arc::new(AsyncShared {
                limits: config.limits,
                inner: Mutex::new(Inner::idle()),
                data_ready: Notify::new(),
                capacity_freed: Notify::new(),
            }),
            task: Mutex::new(TaskSlot::Empty),
        }
    }

    fn task_slot(&self) -> MutexGuard<'_, TaskSlot> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the worker task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ReaderError::AlreadyRunning`] if a task is attached or a `stop()` is still waiting
    /// for it, [`ReaderError::Spawn`] when called outside a tokio runtime.
    pub fn start<R>(&self, source: R) -> Result<(), ReaderError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut slot = self.task_slot();
        if !matches!(*slot, TaskSlot::Empty) {
            return Err(ReaderError::AlreadyRunning);
        }
        self.shared.limits.validate()?;
        let runtime =
            Handle::try_current().map_err(|err| ReaderError::Spawn(io::Error::other(err)))?;

        *self.shared.lock() = Inner::running();
        let (cancel, cancelled) = watch::channel(false);
        let span = tracing::debug_span!(
            parent: &self.span,
            "async_line_reader",
            worker = %self.worker_name
        );
        let task = runtime.spawn(
            pump(source, Arc::clone(&self.shared), cancelled)
                .instrument(span)
                .with_current_subscriber(),
        );
        *slot = TaskSlot::Attached(TaskHandle { task, cancel });
        Ok(())
    }

    /// Cancels the worker, waits for it, and resets to [`ReaderState::Idle`].
    ///
    /// The reader counts as running until the reset is done, so a concurrent `start()` is
    /// rejected. Dropping the returned future early aborts the task and resets anyway.
    ///
    /// # Errors
    ///
    /// [`ReaderError::NotRunning`] if nothing is attached or another `stop()` is in progress,
    /// [`ReaderError::WorkerPanicked`] if the task panicked.
    pub async fn stop(&self) -> Result<(), ReaderError> {
        let handle = {
            let mut slot = self.task_slot();
            match mem::replace(&mut *slot, TaskSlot::Stopping) {
                TaskSlot::Attached(handle) => handle,
                other => {
                    *slot = other;
                    return Err(ReaderError::NotRunning);
                }
            }
        };

        {
            let mut inner = self.shared.lock();
            inner.stop_requested = true;
            inner.state = ReaderState::Stopping;
        }
        handle.cancel.send_replace(true);
        self.shared.capacity_freed.notify_waiters();

        let reset = ResetOnStop {
            reader: self,
            task: handle.task.abort_handle(),
        };
        let joined = handle.task.await;
        drop(reset);
        debug!(worker = %self.worker_name, "async reader stopped");

        joined.map_err(|_| ReaderError::WorkerPanicked)
    }

    /// True from `start()` until `stop()` has finished resetting the reader.
    pub fn is_running(&self) -> bool {
        !matches!(*self.task_slot(), TaskSlot::Empty)
    }

    pub fn state(&self) -> ReaderState {
        self.shared.lock().state
    }

    pub fn latched_error(&self) -> Option<SourceFailure> {
        self.shared.lock().latched.clone()
    }

    pub fn chars_ready(&self) -> usize {
        self.shared.lock().buffer.chars_ready()
    }

    pub fn lines_ready(&self) -> usize {
        self.shared.lock().buffer.lines_ready()
    }

    pub async fn get_char(&self) -> Result<u8, ReaderError> {
        self.take_when_available(LineBuffer::chars_ready, |buffer| {
            Ok(buffer.get_char()?)
        })
        .await
    }

    pub async fn get_line(&self) -> Result<Vec<u8>, ReaderError> {
        self.take_when_available(LineBuffer::lines_ready, |buffer| {
            Ok(buffer.get_line()?)
        })
        .await
    }

    async fn take_when_available<T>(
        &self,
        available: fn(&LineBuffer) -> usize,
        take: impl Fn(&mut LineBuffer) -> Result<T, ReaderError>,
    ) -> Result<T, ReaderError> {
        loop {
            let notified = self.shared.data_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.shared.lock();
                if available(&inner.buffer) > 0 {
                    let value = take(&mut inner.buffer);
                    drop(inner);
                    self.shared.capacity_freed.notify_waiters();
                    return value;
                }
                if let Some(failure) = &inner.latched {
                    return Err(ReaderError::Source(failure.clone()));
                }
                if inner.state == ReaderState::Idle {
                    return Err(ReaderError::NotRunning);
                }
            }

            notified.await;
        }
    }
}

impl Drop for AsyncLineReader {
    fn drop(&mut self) {
        if let TaskSlot::Attached(handle) = mem::take(&mut *self.task_slot()) {
            handle.cancel.send_replace(true);
            handle.task.abort();
        }
    }
}

/// Finishes a `stop()`, including one whose future was dropped before the task ended.
struct ResetOnStop<'a> {
    reader: &'a AsyncLineReader,
    task: AbortHandle,
}

impl Drop for ResetOnStop<'_> {
    fn drop(&mut self) {
        self.task.abort();
        *self.reader.shared.lock() = Inner::idle();
        self.reader.shared.data_ready.notify_waiters();
        *self.reader.task_slot() = TaskSlot::Empty;
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ChunkOutcome {
    Stored,
    Interrupted,
}

async fn pump<R>(mut source: R, shared: Arc<AsyncShared>, mut cancelled: watch::Receiver<bool>)
where
    R: AsyncRead + Unpin,
{
    debug!("async reader worker running");
    let mut chunk = vec![0u8; STREAM_CHUNK_BYTES];
    let outcome = loop {
        if *cancelled.borrow() {
            break Ok(());
        }
        let read = tokio::select! {
            biased;
            _ = cancelled.changed() => break Ok(()),
            read = source.read(&mut chunk) => read,
        };
        let n = match read {
            Ok(0) => break Err(SourceFailure::EndOfStream),
            Ok(n) => n,
            Err(err) => break Err(SourceFailure::read(&err)),
        };
        trace!(bytes = n, "read chunk from source");
        if store(&shared, &chunk[..n], &mut cancelled).await == ChunkOutcome::Interrupted {
            break Ok(());
        }
    };

    match outcome {
        Ok(()) => debug!("async reader worker exiting on stop request"),
        Err(failure) => {
            warn!(error = %failure, "async reader worker stopped on source failure");
            let mut inner = shared.lock();
            if !*cancelled.borrow() {
                inner.latch(failure);
            }
            drop(inner);
            shared.data_ready.notify_waiters();
        }
    }
}

async fn store(
    shared: &AsyncShared,
    chunk: &[u8],
    cancelled: &mut watch::Receiver<bool>,
) -> ChunkOutcome {
    let mut stored = 0usize;
    loop {
        let freed = shared.capacity_freed.notified();
        tokio::pin!(freed);
        freed.as_mut().enable();

        {
            let mut inner = shared.lock();
            // A cancelled task may outlive the reset when `stop()` was abandoned.
            if inner.stop_requested || *cancelled.borrow() {
                debug!(
                    dropped = chunk.len() - stored,
                    "stop requested while waiting for capacity; dropping rest of chunk"
                );
                return ChunkOutcome::Interrupted;
            }
            while stored < chunk.len() && !inner.buffer.is_full(&shared.limits) {
                inner.buffer.put_char(chunk[stored]);
                stored += 1;
            }
        }
        shared.data_ready.notify_waiters();

        if stored == chunk.len() {
            return ChunkOutcome::Stored;
        }

        tokio::select! {
            _ = &mut freed => {}
            _ = cancelled.changed() => {
                debug!(
                    dropped = chunk.len() - stored,
                    "stop requested while waiting for capacity; dropping rest of chunk"
                );
                return ChunkOutcome::Interrupted;
            }
        }
    }
}
