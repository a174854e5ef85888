//! Out-of-band wakeup for the worker's readiness wait.
//!
//! The worker blocks in [`ReadinessWait::wait`] until either the source descriptor turns
//! readable or a controller raises the paired [`WakeupSignal`]. The signal carries no data;
//! it only interrupts the wait so the worker can notice a stop request.

use std::{
    io,
    os::fd::{AsRawFd, BorrowedFd},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use mio::{unix::SourceFd, Events, Interest, Poll, Token, Waker};

const SOURCE_TOKEN: Token = Token(0);
const WAKEUP_TOKEN: Token = Token(1);
const EVENTS_CAPACITY: usize = 4;

#[derive(Debug)]
struct WakeupInner {
    waker: Waker,
    signalled: AtomicBool,
}

/// Cloneable handle that interrupts a [`ReadinessWait`].
#[derive(Debug, Clone)]
pub struct WakeupSignal {
    inner: Arc<WakeupInner>,
}

impl WakeupSignal {
    /// Raises the signal. Repeated calls after the first are no-ops.
    pub fn signal(&self) -> io::Result<()> {
        if self.inner.signalled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.waker.wake()
    }

    pub fn is_signalled(&self) -> bool {
        self.inner.signalled.load(Ordering::Acquire)
    }
}

/// What a single [`ReadinessWait::wait`] observed.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Readiness {
    pub source: bool,
    pub cancelled: bool,
}

/// Multiplexed wait over one source descriptor and one [`WakeupSignal`].
#[derive(Debug)]
pub struct ReadinessWait {
    poll: Poll,
    events: Events,
    signal: WakeupSignal,
}

impl ReadinessWait {
    /// Registers `source` for readability and creates the paired wakeup signal.
    ///
    /// The descriptor is only borrowed for registration; the caller must keep it open for as
    /// long as it waits.
    pub fn new(source: BorrowedFd<'_>) -> io::Result<(Self, WakeupSignal)> {
        let poll = Poll::new()?;
        let raw = source.as_raw_fd();
        poll.registry()
            .register(&mut SourceFd(&raw), SOURCE_TOKEN, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKEUP_TOKEN)?;
        let signal = WakeupSignal {
            inner: Arc::new(WakeupInner {
                waker,
                signalled: AtomicBool::new(false),
            }),
        };
        let wait = Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            signal: signal.clone(),
        };
        Ok((wait, signal))
    }

    /// Blocks without timeout until the source is readable or the signal is raised.
    ///
    /// Source readiness is edge-reported, so callers should check the source directly before
    /// waiting again.
    pub fn wait(&mut self) -> io::Result<Readiness> {
        loop {
            if let Err(err) = self.poll.poll(&mut self.events, None) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            let mut readiness = Readiness::default();
            for event in self.events.iter() {
                match event.token() {
                    SOURCE_TOKEN => readiness.source = true,
                    WAKEUP_TOKEN => readiness.cancelled = true,
                    _ => {}
                }
            }
            readiness.cancelled |= self.signal.is_signalled();
            return Ok(readiness);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, os::fd::AsFd, os::unix::net::UnixStream, thread, time::Duration};

    use super::*;

    #[test]
    fn wakes_on_source_data() {
        let (mut peer, local) = UnixStream::pair().unwrap();
        let (mut wait, signal) = ReadinessWait::new(local.as_fd()).unwrap();
        peer.write_all(b"x").unwrap();

        let readiness = wait.wait().unwrap();
        assert!(readiness.source);
        assert!(!readiness.cancelled);
        assert!(!signal.is_signalled());
    }

    #[test]
    fn signal_interrupts_idle_wait() {
        let (_peer, local) = UnixStream::pair().unwrap();
        let (mut wait, signal) = ReadinessWait::new(local.as_fd()).unwrap();

        let waiter = thread::spawn(move || wait.wait().unwrap());
        thread::sleep(Duration::from_millis(20));
        signal.signal().unwrap();
        signal.signal().unwrap();

        let readiness = waiter.join().unwrap();
        assert!(readiness.cancelled);
        assert!(!readiness.source);
        assert!(signal.is_signalled());
    }

    #[test]
    fn signal_raised_before_wait_is_not_lost() {
        let (_peer, local) = UnixStream::pair().unwrap();
        let (mut wait, signal) = ReadinessWait::new(local.as_fd()).unwrap();
        signal.signal().unwrap();
        assert!(wait.wait().unwrap().cancelled);
    }
}
