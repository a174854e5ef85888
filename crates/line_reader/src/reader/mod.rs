//! Background reader that pumps a [`ByteSource`] into a bounded [`LineBuffer`].
//!
//! One worker thread per started reader is the only code that touches the source. The
//! worker and every consumer share one mutex over the buffer, the error latch, the state and
//! the stop flag. Two condition variables sit on top of it:
//!
//! - `data_ready`: new bytes, a latched error, or a reset. Consumers wait here.
//! - `capacity_freed`: a consumer popped something, or stop was requested. The worker waits
//!   here while the buffer is full.
//!
//! `stop()` is a hard reset: buffered but unconsumed data is discarded.

mod consumer;
mod worker;

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use tracing::{debug, warn};

use crate::{
    config::{ReaderConfig, ReaderLimits},
    error::{ReaderError, SourceFailure},
    line_buffer::LineBuffer,
    source::ByteSource,
    wakeup::{ReadinessWait, WakeupSignal},
};

use worker::Worker;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReaderState {
    /// No worker, empty buffer, no latched error.
    Idle,
    Running,
    /// Stop was requested or the worker ended on a failure; `stop()` has not joined it yet.
    Stopping,
}

/// State guarded by the reader mutex. Also reused by the tokio reader.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) buffer: LineBuffer,
    pub(crate) state: ReaderState,
    pub(crate) stop_requested: bool,
    pub(crate) latched: Option<SourceFailure>,
}

impl Inner {
    pub(crate) fn idle() -> Self {
        Self {
            buffer: LineBuffer::new(),
            state: ReaderState::Idle,
            stop_requested: false,
            latched: None,
        }
    }

    pub(crate) fn running() -> Self {
        Self {
            state: ReaderState::Running,
            ..Self::idle()
        }
    }

    /// Records a worker failure unless one is already latched.
    pub(crate) fn latch(&mut self, failure: SourceFailure) {
        if self.latched.is_none() {
            self.latched = Some(failure);
        }
        self.state = ReaderState::Stopping;
    }
}

#[derive(Debug)]
struct Shared {
    limits: ReaderLimits,
    inner: Mutex<Inner>,
    data_ready: Condvar,
    capacity_freed: Condvar,
}

impl Shared {
    // Every critical section leaves `Inner` consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_data_ready<'a>(&self, guard: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
        self.data_ready
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_capacity_freed<'a>(&self, guard: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
        self.capacity_freed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct WorkerHandle {
    thread: JoinHandle<()>,
    wakeup: WakeupSignal,
}

/// Bounded reader with blocking character/line retrieval.
///
/// All methods take `&self`, so a reader can be shared between threads behind an `Arc`.
#[derive(Debug)]
pub struct BoundedAsyncReader {
    config: ReaderConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Default for BoundedAsyncReader {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}

impl BoundedAsyncReader {
    pub fn new(config: ReaderConfig) -> Self {
        let shared = Arc::new(Shared {
            limits: config.limits,
            inner: Mutex::new(Inner::idle()),
            data_ready: Condvar::new(),
            capacity_freed: Condvar::new(),
        });
        Self {
            config,
            shared,
            worker: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> ReaderLimits {
        self.shared.limits
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands `source` to a new worker thread.
    ///
    /// # Errors
    ///
    /// [`ReaderError::AlreadyRunning`] if a worker is already attached (even one that ended
    /// on a failure and has not been stopped yet).
    pub fn start<S: ByteSource>(&self, source: S) -> Result<(), ReaderError> {
        let mut slot = self.worker_slot();
        if slot.is_some() {
            return Err(ReaderError::AlreadyRunning);
        }
        self.shared.limits.validate()?;

        let (wait, wakeup) =
            ReadinessWait::new(source.readiness_fd()).map_err(ReaderError::Setup)?;

        *self.shared.lock() = Inner::running();

        let worker = Worker::new(source, wait, Arc::clone(&self.shared));
        let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
        let span = self.config.span.clone();
        let spawned = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    let _entered = span.enter();
                    worker.run();
                })
            });

        match spawned {
            Ok(thread) => {
                *slot = Some(WorkerHandle { thread, wakeup });
                debug!(worker = %self.config.worker_name, "reader started");
                Ok(())
            }
            Err(err) => {
                *self.shared.lock() = Inner::idle();
                Err(ReaderError::Spawn(err))
            }
        }
    }

    /// Stops the worker, joins it, and resets to [`ReaderState::Idle`].
    ///
    /// Buffered data that was not consumed is discarded, as is any latched error.
    ///
    /// # Errors
    ///
    /// [`ReaderError::NotRunning`] if no worker is attached, [`ReaderError::WorkerPanicked`]
    /// if the worker thread panicked (the reader is reset regardless).
    pub fn stop(&self) -> Result<(), ReaderError> {
        let mut slot = self.worker_slot();
        let Some(handle) = slot.take() else {
            return Err(ReaderError::NotRunning);
        };

        {
            let mut inner = self.shared.lock();
            inner.stop_requested = true;
            inner.state = ReaderState::Stopping;
        }
        self.shared.capacity_freed.notify_all();
        if let Err(err) = handle.wakeup.signal() {
            warn!(error = %err, "failed to signal reader worker; waiting for it anyway");
        }

        let joined = handle.thread.join();

        *self.shared.lock() = Inner::idle();
        self.shared.data_ready.notify_all();
        debug!(worker = %self.config.worker_name, "reader stopped");

        joined.map_err(|_| ReaderError::WorkerPanicked)
    }

    /// True from `start()` until `stop()` returns, including after a latched failure.
    pub fn is_running(&self) -> bool {
        self.worker_slot().is_some()
    }

    pub fn state(&self) -> ReaderState {
        self.shared.lock().state
    }

    pub fn latched_error(&self) -> Option<SourceFailure> {
        self.shared.lock().latched.clone()
    }
}

impl Drop for BoundedAsyncReader {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(err) = self.stop() {
                warn!(error = %err, "reader did not stop cleanly on drop");
            }
        }
    }
}
