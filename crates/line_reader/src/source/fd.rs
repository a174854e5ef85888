use std::{
    io,
    os::fd::{AsFd, BorrowedFd, OwnedFd},
};

use rustix::{
    event::{poll, PollFd, PollFlags, Timespec},
    io::Errno,
    net::{recv, RecvFlags},
};

use super::ByteSource;

pub const STREAM_CHUNK_BYTES: usize = 4096;
const DATAGRAM_INITIAL_BYTES: usize = 32;
const DATAGRAM_GROWTH_FACTOR: usize = 4;

/// How a descriptor is drained. Fixed for the lifetime of an [`FdSource`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReadMode {
    /// One `read(2)` of up to [`STREAM_CHUNK_BYTES`].
    Stream,
    /// One whole datagram per read, sized by peeking first.
    Datagram,
}

/// [`ByteSource`] over an owned descriptor (socket, pipe, terminal).
#[derive(Debug)]
pub struct FdSource {
    fd: OwnedFd,
    mode: ReadMode,
}

impl FdSource {
    pub fn new(fd: impl Into<OwnedFd>, mode: ReadMode) -> Self {
        Self {
            fd: fd.into(),
            mode,
        }
    }

    pub fn stream(fd: impl Into<OwnedFd>) -> Self {
        Self::new(fd, ReadMode::Stream)
    }

    pub fn datagram(fd: impl Into<OwnedFd>) -> Self {
        Self::new(fd, ReadMode::Datagram)
    }

    /// Reads from a duplicate of `fd`; the original stays usable (e.g. for writing).
    pub fn duplicate(fd: BorrowedFd<'_>, mode: ReadMode) -> io::Result<Self> {
        Ok(Self::new(fd.try_clone_to_owned()?, mode))
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    fn read_stream(&self) -> io::Result<Vec<u8>> {
        let mut chunk = vec![0u8; STREAM_CHUNK_BYTES];
        let n = retry_interrupted(|| rustix::io::read(&self.fd, &mut chunk[..]))?;
        chunk.truncate(n);
        Ok(chunk)
    }

    fn read_datagram(&self) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; DATAGRAM_INITIAL_BYTES];
        loop {
            let peeked = recv_retrying(&self.fd, &mut buffer, RecvFlags::PEEK)?;
            if peeked < buffer.len() {
                break;
            }
            buffer.resize(buffer.len() * DATAGRAM_GROWTH_FACTOR, 0);
        }
        let received = recv_retrying(&self.fd, &mut buffer, RecvFlags::empty())?;
        buffer.truncate(received);
        Ok(buffer)
    }
}

/// Reruns `op` while it fails with `EINTR`.
fn retry_interrupted<T>(mut op: impl FnMut() -> rustix::io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(Errno::INTR) => continue,
            other => return other.map_err(io::Error::from),
        }
    }
}

fn recv_retrying(fd: &OwnedFd, buffer: &mut [u8], flags: RecvFlags) -> io::Result<usize> {
    let (received, _) = retry_interrupted(|| recv(fd, &mut buffer[..], flags))?;
    Ok(received)
}

impl ByteSource for FdSource {
    fn is_ready_for_reading(&self) -> io::Result<bool> {
        let mut fds = [PollFd::new(&self.fd, PollFlags::IN)];
        let no_wait = Timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if retry_interrupted(|| poll(&mut fds, Some(&no_wait)))? == 0 {
            return Ok(false);
        }
        Ok(fds[0]
            .revents()
            .intersects(PollFlags::IN | PollFlags::HUP | PollFlags::ERR))
    }

    fn read(&mut self) -> io::Result<Vec<u8>> {
        match self.mode {
            ReadMode::Stream => self.read_stream(),
            ReadMode::Datagram => self.read_datagram(),
        }
    }

    fn readiness_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
