use std::collections::VecDeque;

use crate::config::ReaderLimits;
use crate::error::LineBufferError;

const NEWLINE: u8 = b'\n';

/// FIFO byte store that counts complete `\n`-terminated lines as bytes come and go.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    bytes: VecDeque<u8>,
    lines_ready: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.lines_ready = 0;
    }

    pub fn put_char(&mut self, byte: u8) {
        self.bytes.push_back(byte);
        if byte == NEWLINE {
            self.lines_ready += 1;
        }
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.put_char(byte);
        }
    }

    pub fn chars_ready(&self) -> usize {
        self.bytes.len()
    }

    pub fn lines_ready(&self) -> usize {
        self.lines_ready
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Full only when both ceilings are reached; either one having room keeps it accepting.
    pub fn is_full(&self, limits: &ReaderLimits) -> bool {
        self.chars_ready() >= limits.max_buffered_bytes
            && self.lines_ready() >= limits.max_buffered_lines
    }

    pub fn get_char(&mut self) -> Result<u8, LineBufferError> {
        let byte = self
            .bytes
            .pop_front()
            .ok_or(LineBufferError::BufferEmpty)?;
        if byte == NEWLINE {
            self.lines_ready -= 1;
        }
        Ok(byte)
    }

    /// Removes the oldest complete line and returns it without its terminator.
    ///
    /// No line-ending normalization happens: a `\r` before the `\n` stays in the payload.
    pub fn get_line(&mut self) -> Result<Vec<u8>, LineBufferError> {
        if self.lines_ready == 0 {
            return Err(LineBufferError::NoCompleteLine);
        }
        let Some(end) = self.bytes.iter().position(|b| *b == NEWLINE) else {
            return Err(LineBufferError::NoCompleteLine);
        };
        let mut line: Vec<u8> = self.bytes.drain(..=end).collect();
        line.pop();
        self.lines_ready -= 1;
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(data: &[u8]) -> LineBuffer {
        let mut buffer = LineBuffer::new();
        buffer.put_slice(data);
        buffer
    }

    #[test]
    fn counts_track_pushed_newlines() {
        let mut buffer = LineBuffer::new();
        for (idx, byte) in b"a\nbc\n\nd".iter().enumerate() {
            buffer.put_char(*byte);
            let pushed = &b"a\nbc\n\nd"[..=idx];
            assert_eq!(buffer.chars_ready(), pushed.len());
            assert_eq!(
                buffer.lines_ready(),
                pushed.iter().filter(|b| **b == b'\n').count()
            );
        }
    }

    #[test]
    fn get_line_strips_terminator_and_empties_buffer() {
        let mut buffer = filled(b"abcd\n");
        assert_eq!(buffer.lines_ready(), 1);
        assert_eq!(buffer.get_line().unwrap(), b"abcd");
        assert_eq!(buffer.lines_ready(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn line_split_across_pushes_is_joined() {
        let mut buffer = filled(b"abcd");
        assert_eq!(buffer.lines_ready(), 0);
        buffer.put_slice(b"efgh\n");
        assert_eq!(buffer.lines_ready(), 1);
        assert_eq!(buffer.get_line().unwrap(), b"abcdefgh");
    }

    #[test]
    fn multiple_lines_leave_unterminated_residue() {
        let mut buffer = filled(b"abcd\nefgh\nij");
        assert_eq!(buffer.lines_ready(), 2);
        assert_eq!(buffer.get_line().unwrap(), b"abcd");
        assert_eq!(buffer.get_line().unwrap(), b"efgh");
        assert_eq!(buffer.chars_ready(), 2);
        assert_eq!(buffer.lines_ready(), 0);
        assert_eq!(buffer.get_line(), Err(LineBufferError::NoCompleteLine));
    }

    #[test]
    fn mixed_char_and_line_reads() {
        let mut buffer = filled(b"abcd\nef");
        assert_eq!(buffer.get_char().unwrap(), b'a');
        assert_eq!(buffer.lines_ready(), 1);
        assert_eq!(buffer.get_line().unwrap(), b"bcd");
        assert_eq!(buffer.get_char().unwrap(), b'e');
        assert_eq!(buffer.get_char().unwrap(), b'f');
        assert_eq!(buffer.get_char(), Err(LineBufferError::BufferEmpty));
    }

    #[test]
    fn popping_newline_by_char_decrements_lines() {
        let mut buffer = filled(b"\n\n");
        assert_eq!(buffer.get_char().unwrap(), b'\n');
        assert_eq!(buffer.lines_ready(), 1);
        assert_eq!(buffer.get_line().unwrap(), b"");
        assert_eq!(buffer.lines_ready(), 0);
    }

    #[test]
    fn carriage_return_is_kept() {
        let mut buffer = filled(b"ping\r\n");
        assert_eq!(buffer.get_line().unwrap(), b"ping\r");
    }

    #[test]
    fn full_only_when_both_ceilings_reached() {
        let limits = ReaderLimits {
            max_buffered_bytes: 4,
            max_buffered_lines: 1,
        };
        let mut buffer = filled(b"abcdef");
        assert!(!buffer.is_full(&limits), "no complete line yet");
        buffer.put_char(b'\n');
        assert!(buffer.is_full(&limits));

        let buffer = filled(b"\n\n");
        assert!(!buffer.is_full(&limits), "bytes still have room");
    }

    #[test]
    fn clear_resets_counts() {
        let mut buffer = filled(b"a\nb\n");
        buffer.clear();
        assert_eq!(buffer.chars_ready(), 0);
        assert_eq!(buffer.lines_ready(), 0);
    }
}
