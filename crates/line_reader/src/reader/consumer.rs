use std::sync::MutexGuard;

use super::{BoundedAsyncReader, Inner, ReaderState};
use crate::{error::ReaderError, line_buffer::LineBuffer};

impl BoundedAsyncReader {
    pub fn chars_ready(&self) -> usize {
        self.shared.lock().buffer.chars_ready()
    }

    pub fn lines_ready(&self) -> usize {
        self.shared.lock().buffer.lines_ready()
    }

    /// Blocks until a byte is buffered and returns it.
    ///
    /// # Errors
    ///
    /// Once the buffer is drained after the worker failed, the latched
    /// [`ReaderError::Source`] is returned on every call until the reader is stopped.
    /// [`ReaderError::NotRunning`] if the reader is idle.
    pub fn get_char(&self) -> Result<u8, ReaderError> {
        let mut inner = self.wait_until_available(LineBuffer::chars_ready)?;
        let byte = inner.buffer.get_char()?;
        drop(inner);
        self.shared.capacity_freed.notify_all();
        Ok(byte)
    }

    /// Blocks until a complete line is buffered and returns it without the `\n`.
    ///
    /// # Errors
    ///
    /// Same as [`get_char`](Self::get_char). Bytes of an unterminated trailing line are still
    /// available through `get_char` after the error surfaces here.
    pub fn get_line(&self) -> Result<Vec<u8>, ReaderError> {
        let mut inner = self.wait_until_available(LineBuffer::lines_ready)?;
        let line = inner.buffer.get_line()?;
        drop(inner);
        self.shared.capacity_freed.notify_all();
        Ok(line)
    }

    /// [`get_line`](Self::get_line) decoded as UTF-8.
    ///
    /// # Errors
    ///
    /// [`ReaderError::InvalidUtf8`] if the line is not UTF-8; the line is consumed either way.
    pub fn get_line_string(&self) -> Result<String, ReaderError> {
        String::from_utf8(self.get_line()?).map_err(|_| ReaderError::InvalidUtf8)
    }

    fn wait_until_available(
        &self,
        available: fn(&LineBuffer) -> usize,
    ) -> Result<MutexGuard<'_, Inner>, ReaderError> {
        let mut inner = self.shared.lock();
        while available(&inner.buffer) == 0
            && inner.latched.is_none()
            && inner.state != ReaderState::Idle
        {
            inner = self.shared.wait_data_ready(inner);
        }
        if available(&inner.buffer) > 0 {
            return Ok(inner);
        }
        match &inner.latched {
            Some(failure) => Err(ReaderError::Source(failure.clone())),
            None => Err(ReaderError::NotRunning),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, os::unix::net::UnixStream, sync::Arc, thread, time::Duration};

    use crate::{BoundedAsyncReader, FdSource, ReaderError, SourceFailure};

    fn started() -> (BoundedAsyncReader, UnixStream) {
        let reader = BoundedAsyncReader::default();
        let (peer, local) = UnixStream::pair().unwrap();
        reader.start(FdSource::stream(local)).unwrap();
        (reader, peer)
    }

    #[test]
    fn idle_reader_does_not_block_consumers() {
        let reader = BoundedAsyncReader::default();
        assert_eq!(reader.chars_ready(), 0);
        assert!(matches!(reader.get_char(), Err(ReaderError::NotRunning)));
        assert!(matches!(reader.get_line(), Err(ReaderError::NotRunning)));
    }

    #[test]
    fn get_line_waits_for_terminator() {
        let (reader, mut peer) = started();
        let reader = Arc::new(reader);

        let consumer = {
            let reader = Arc::clone(&reader);
            thread::spawn(move || reader.get_line_string())
        };
        peer.write_all(b"hel").unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!consumer.is_finished());
        peer.write_all(b"lo\n").unwrap();

        assert_eq!(consumer.join().unwrap().unwrap(), "hello");
        assert_eq!(reader.chars_ready(), 0);
    }

    #[test]
    fn invalid_utf8_line_is_reported_and_consumed() {
        let (reader, mut peer) = started();
        peer.write_all(b"\xff\xfe\nok\n").unwrap();
        assert!(matches!(
            reader.get_line_string(),
            Err(ReaderError::InvalidUtf8)
        ));
        assert_eq!(reader.get_line_string().unwrap(), "ok");
    }

    #[test]
    fn blocked_consumer_observes_stop() {
        let (reader, _peer) = started();
        let reader = Arc::new(reader);
        let consumer = {
            let reader = Arc::clone(&reader);
            thread::spawn(move || reader.get_char())
        };
        thread::sleep(Duration::from_millis(20));
        reader.stop().unwrap();
        assert!(matches!(
            consumer.join().unwrap(),
            Err(ReaderError::NotRunning)
        ));
    }

    #[test]
    fn error_is_repeated_until_reset() {
        let (reader, peer) = started();
        drop(peer);
        for _ in 0..3 {
            match reader.get_char() {
                Err(ReaderError::Source(SourceFailure::EndOfStream)) => {}
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }
}
