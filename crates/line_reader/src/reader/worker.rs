use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::Shared;
use crate::{error::SourceFailure, source::ByteSource, wakeup::ReadinessWait};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ChunkOutcome {
    Stored,
    /// Stop fired while waiting for capacity; the rest of the chunk was dropped.
    Interrupted,
}

pub(super) struct Worker<S> {
    source: S,
    wait: ReadinessWait,
    shared: Arc<Shared>,
}

impl<S: ByteSource> Worker<S> {
    pub(super) fn new(source: S, wait: ReadinessWait, shared: Arc<Shared>) -> Self {
        Self {
            source,
            wait,
            shared,
        }
    }

    pub(super) fn run(mut self) {
        debug!("reader worker running");
        match self.pump() {
            Ok(()) => debug!("reader worker exiting on stop request"),
            Err(failure) => {
                warn!(error = %failure, "reader worker stopped on source failure");
                self.shared.lock().latch(failure);
                self.shared.data_ready.notify_all();
            }
        }
    }

    fn pump(&mut self) -> Result<(), SourceFailure> {
        loop {
            if self.shared.lock().stop_requested {
                return Ok(());
            }

            let ready = self
                .source
                .is_ready_for_reading()
                .map_err(|err| SourceFailure::read(&err))?;
            if !ready {
                let readiness = self
                    .wait
                    .wait()
                    .map_err(|err| SourceFailure::wait(&err))?;
                if readiness.cancelled {
                    return Ok(());
                }
                continue;
            }

            let chunk = self
                .source
                .read()
                .map_err(|err| SourceFailure::read(&err))?;
            if chunk.is_empty() {
                return Err(SourceFailure::EndOfStream);
            }
            trace!(bytes = chunk.len(), "read chunk from source");

            if self.store(&chunk) == ChunkOutcome::Interrupted {
                return Ok(());
            }
        }
    }

    /// Appends `chunk` byte by byte, blocking on capacity while the buffer is full.
    ///
    /// Consumers are woken once per chunk, and additionally right before the worker blocks
    /// on a full buffer so they can drain the bytes that filled it.
    fn store(&self, chunk: &[u8]) -> ChunkOutcome {
        let shared = &self.shared;
        let mut inner = shared.lock();
        let mut unannounced = 0usize;

        for (idx, &byte) in chunk.iter().enumerate() {
            while inner.buffer.is_full(&shared.limits) && !inner.stop_requested {
                if unannounced > 0 {
                    unannounced = 0;
                    shared.data_ready.notify_all();
                }
                inner = shared.wait_capacity_freed(inner);
            }
            if inner.stop_requested {
                debug!(
                    dropped = chunk.len() - idx,
                    "stop requested while waiting for capacity; dropping rest of chunk"
                );
                return ChunkOutcome::Interrupted;
            }
            inner.buffer.put_char(byte);
            unannounced += 1;
        }

        drop(inner);
        shared.data_ready.notify_all();
        ChunkOutcome::Stored
    }
}
