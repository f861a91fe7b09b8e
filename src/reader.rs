use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;

use crate::error::Position;

pub const DEFAULT_LINE_BUFFER: usize = 8192;

// Bytes of context shown before an error position.
const CONTEXT_LEN: usize = 16;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Fill {
    Line,
    Eof,
}

/// Hands out the input through a bounded buffer, one line at a time.
/// A line longer than the buffer comes in several chunks.
pub(crate) struct LineReader {
    src: Box<dyn BufRead>,
    buf: Vec<u8>,
    cap: usize,
    pos: usize,
    line: u32,
    // bytes of the current line handed out in earlier chunks.
    offset: usize,
    // the buffer ends in the middle of a line.
    partial: bool,
    // drop the rest of the current line on the next refill.
    skipping: bool,
}

impl LineReader {
    pub fn from_file(path: &Path, cap: usize) -> io::Result<LineReader> {
        let file = File::open(path)?;
        Ok(LineReader::new(Box::new(BufReader::new(file)), cap))
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>, cap: usize) -> LineReader {
        LineReader::new(Box::new(Cursor::new(data.into())), cap)
    }

    fn new(src: Box<dyn BufRead>, cap: usize) -> LineReader {
        LineReader {
            src,
            buf: Vec::with_capacity(cap + 1),
            cap: cap.max(2),
            pos: 0,
            line: 0,
            offset: 0,
            partial: false,
            skipping: false,
        }
    }

    /// Load the next line, or the next chunk of the current one.
    pub fn refill(&mut self) -> io::Result<Fill> {
        loop {
            let continued = self.partial;
            self.offset = if continued { self.offset + self.buf.len() } else { 0 };
            self.buf.clear();
            self.pos = 0;

            let n = self.src.by_ref().take(self.cap as u64).read_until(b'\n', &mut self.buf)?;
            if n == 0 {
                self.partial = false;
                self.skipping = false;
                return Ok(Fill::Eof);
            }
            if !continued {
                self.line += 1;
            }
            // an escape at the end of a chunk needs to see the next byte.
            if self.buf[n - 1] == b'\\' {
                self.src.by_ref().take(1).read_until(b'\n', &mut self.buf)?;
            }
            self.partial = self.buf.last() != Some(&b'\n');

            if continued && self.skipping {
                self.skipping = self.partial;
                continue;
            }
            return Ok(Fill::Line);
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Byte `n` places after the current one, on the current line.
    pub fn peek(&self, n: usize) -> Option<u8> {
        self.buf.get(self.pos + n).copied()
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    /// Skip to the end of the line, including chunks not read yet.
    pub fn skip_line(&mut self) {
        self.pos = self.buf.len();
        self.skipping = self.partial;
    }

    /// The unread part of the current line.
    pub fn rest_of_line(&self) -> &[u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    pub fn at_input_start(&self) -> bool {
        self.line == 1 && self.offset == 0 && self.pos == 0
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, (self.offset + self.pos) as u32 + 1)
    }

    /// Up to 16 bytes right before the current position, never reaching
    /// back past the start of the line (or of the chunk).
    pub fn context(&self) -> String {
        let end = self.pos.min(self.buf.len());
        let start = end.saturating_sub(CONTEXT_LEN);
        String::from_utf8_lossy(&self.buf[start..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_and_positions() {
        let mut r = LineReader::from_bytes("ab\ncd", 64);
        assert_eq!(r.refill().unwrap(), Fill::Line);
        assert!(r.at_input_start());
        assert_eq!(r.peek(0), Some(b'a'));
        r.advance(1);
        assert_eq!(r.position(), Position::new(1, 2));
        assert_eq!(r.context(), "a");
        assert_eq!(r.rest_of_line(), b"b\n");
        r.skip_line();
        assert!(r.at_end());
        assert_eq!(r.refill().unwrap(), Fill::Line);
        assert_eq!(r.rest_of_line(), b"cd");
        assert_eq!(r.position(), Position::new(2, 1));
        assert_eq!(r.refill().unwrap(), Fill::Eof);
    }

    #[test]
    fn context_is_clamped() {
        let mut r = LineReader::from_bytes("0123456789abcdefghij\n", 64);
        r.refill().unwrap();
        r.advance(20);
        assert_eq!(r.context(), "456789abcdefghij");
    }

    #[test]
    fn long_line_in_chunks() {
        let mut r = LineReader::from_bytes("abcdefghij\nxy\n", 4);
        assert_eq!(r.refill().unwrap(), Fill::Line);
        assert_eq!(r.rest_of_line(), b"abcd");
        r.advance(4);
        assert_eq!(r.refill().unwrap(), Fill::Line);
        assert_eq!(r.rest_of_line(), b"efgh");
        assert!(!r.at_input_start());
        r.advance(1);
        assert_eq!(r.position(), Position::new(1, 6));
        assert_eq!(r.refill().unwrap(), Fill::Line);
        assert_eq!(r.rest_of_line(), b"ij\n");
        assert_eq!(r.refill().unwrap(), Fill::Line);
        assert_eq!(r.rest_of_line(), b"xy\n");
        assert_eq!(r.position(), Position::new(2, 1));
        assert_eq!(r.refill().unwrap(), Fill::Eof);
    }

    #[test]
    fn skip_line_spans_chunks() {
        let mut r = LineReader::from_bytes("# a long comment\nnext\n", 4);
        r.refill().unwrap();
        r.skip_line();
        assert_eq!(r.refill().unwrap(), Fill::Line);
        assert_eq!(r.rest_of_line(), b"next");
        assert_eq!(r.position(), Position::new(2, 1));
    }

    #[test]
    fn escape_at_chunk_end() {
        let mut r = LineReader::from_bytes("abc\\\ndef\n", 4);
        r.refill().unwrap();
        assert_eq!(r.rest_of_line(), b"abc\\\n");
        assert_eq!(r.refill().unwrap(), Fill::Line);
        assert_eq!(r.rest_of_line(), b"def\n");
        assert_eq!(r.position(), Position::new(2, 1));
    }
}
