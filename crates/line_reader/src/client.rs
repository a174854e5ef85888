use std::{io::Write, os::fd::AsFd};

use crate::{
    config::ReaderConfig,
    error::{AttachError, ClientError, ReaderError},
    reader::BoundedAsyncReader,
    source::{FdSource, ReadMode},
};

/// Line-oriented client over an already-connected duplex stream.
///
/// The stream is written to directly; a duplicate of its descriptor feeds a
/// [`BoundedAsyncReader`]. Establishing the connection is the caller's job.
#[derive(Debug)]
pub struct LineClient<W> {
    writer: Option<W>,
    reader: BoundedAsyncReader,
}

impl<W: Write + AsFd> Default for LineClient<W> {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}

impl<W: Write + AsFd> LineClient<W> {
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            writer: None,
            reader: BoundedAsyncReader::new(config),
        }
    }

    /// Builds a client and attaches it to `stream` in one go.
    pub fn connected(stream: W, config: ReaderConfig) -> Result<Self, ClientError> {
        let mut client = Self::new(config);
        client.attach(stream).map_err(|err| err.error)?;
        Ok(client)
    }

    /// Starts reading from a duplicate of `stream` and keeps `stream` for sending.
    ///
    /// # Errors
    ///
    /// On failure the stream comes back inside [`AttachError`] untouched.
    pub fn attach(&mut self, stream: W) -> Result<(), AttachError<W>> {
        if self.is_connected() {
            return Err(AttachError {
                error: ReaderError::AlreadyRunning.into(),
                stream,
            });
        }
        let started = FdSource::duplicate(stream.as_fd(), ReadMode::Stream)
            .map_err(ClientError::Duplicate)
            .and_then(|source| self.reader.start(source).map_err(ClientError::from));
        match started {
            Ok(()) => {
                self.writer = Some(stream);
                Ok(())
            }
            Err(error) => Err(AttachError { error, stream }),
        }
    }

    /// Stops reading and hands the stream back. Unconsumed input is discarded.
    pub fn disconnect(&mut self) -> Result<W, ClientError> {
        let stopped = self.reader.stop();
        let writer = self.writer.take();
        stopped?;
        writer.ok_or(ClientError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_running()
    }

    pub fn send_line(&mut self, line: &[u8]) -> Result<(), ClientError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line);
        data.push(b'\n');
        self.send_raw(&data)
    }

    pub fn send_raw(&mut self, data: &[u8]) -> Result<(), ClientError> {
        let writer = self.writer.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(data).map_err(ClientError::Write)?;
        writer.flush().map_err(ClientError::Write)
    }

    pub fn chars_ready(&self) -> usize {
        self.reader.chars_ready()
    }

    pub fn lines_ready(&self) -> usize {
        self.reader.lines_ready()
    }

    pub fn get_char(&self) -> Result<u8, ClientError> {
        Ok(self.reader.get_char()?)
    }

    pub fn get_line(&self) -> Result<Vec<u8>, ClientError> {
        Ok(self.reader.get_line()?)
    }

    pub fn get_line_string(&self) -> Result<String, ClientError> {
        Ok(self.reader.get_line_string()?)
    }

    /// Next line split on ASCII/Unicode whitespace, for token-per-field protocols.
    pub fn get_line_words(&self) -> Result<Vec<String>, ClientError> {
        let line = self.get_line_string()?;
        Ok(line.split_whitespace().map(str::to_string).collect())
    }

    pub fn reader(&self) -> &BoundedAsyncReader {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Seek, Write},
        os::unix::net::UnixStream,
    };

    use super::*;

    #[test]
    fn send_line_appends_single_newline() {
        let (mut peer, local) = UnixStream::pair().unwrap();
        let mut client = LineClient::connected(local, ReaderConfig::default()).unwrap();

        client.send_line(b"MOVE 3 4").unwrap();
        let mut received = [0u8; 9];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"MOVE 3 4\n");
    }

    #[test]
    fn words_come_from_next_line() {
        let (mut peer, local) = UnixStream::pair().unwrap();
        let client = LineClient::connected(local, ReaderConfig::default()).unwrap();

        peer.write_all(b"SCORE  12 \t7\nrest\n").unwrap();
        assert_eq!(client.get_line_words().unwrap(), ["SCORE", "12", "7"]);
        assert_eq!(client.get_line().unwrap(), b"rest");
    }

    #[test]
    fn disconnected_client_refuses_to_send() {
        let mut client: LineClient<UnixStream> = LineClient::default();
        assert!(!client.is_connected());
        assert!(matches!(
            client.send_raw(b"x"),
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.disconnect(),
            Err(ClientError::Reader(ReaderError::NotRunning))
        ));
    }

    #[test]
    fn disconnect_returns_stream_and_allows_reattach() {
        let (_peer, local) = UnixStream::pair().unwrap();
        let mut client = LineClient::connected(local, ReaderConfig::default()).unwrap();
        assert!(matches!(
            client.attach(UnixStream::pair().unwrap().0),
            Err(AttachError {
                error: ClientError::Reader(ReaderError::AlreadyRunning),
                ..
            })
        ));

        let stream = client.disconnect().unwrap();
        assert!(!client.is_connected());
        client.attach(stream).unwrap();
        assert!(client.is_connected());
    }

    #[test]
    fn failed_attach_hands_stream_back() {
        let mut file = tempfile::tempfile().unwrap();
        let mut client: LineClient<std::fs::File> = LineClient::default();

        let (error, mut stream) = client
            .attach(file.try_clone().unwrap())
            .unwrap_err()
            .into_parts();
        assert!(
            matches!(error, ClientError::Reader(ReaderError::Setup(_))),
            "{error:?}"
        );
        assert!(!client.is_connected());

        stream.write_all(b"still usable").unwrap();
        file.seek(std::io::SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "still usable");
    }
}
