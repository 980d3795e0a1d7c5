//! Line framing for [`Frame`]s over `tokio_util::codec`.
//!
//! Each decoded item is itself a `Result`: a line that is not a valid
//! frame, or that runs past [`MAX_LINE_LENGTH`], is reported to the
//! consumer as a protocol error while the stream carries on with the
//! next line. Only I/O failures end the stream.
//!
//! Bytes that are not valid UTF-8 are replaced with `U+FFFD` before
//! the line is parsed.

use std::cmp;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MetroError;
use crate::frame::Frame;

/// Longest line accepted from the server, in bytes.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Outcome of decoding a single line.
pub type Decoded = Result<Frame, MetroError>;

enum RawLine {
    Complete(BytesMut),
    TooLong,
}

#[derive(Debug)]
pub struct MetroCodec {
    max_length: usize,
    /// Where the newline search resumes, so partial lines are not rescanned.
    next_index: usize,
    /// Skipping the rest of an over-long line.
    discarding: bool,
}

impl MetroCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn next_line(&mut self, src: &mut BytesMut) -> Option<RawLine> {
        loop {
            let read_to = cmp::min(self.max_length.saturating_add(1), src.len());
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return None;
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset + 1;
                    self.next_index = 0;
                    return Some(RawLine::Complete(src.split_to(end)));
                }
                (false, None) if src.len() > self.max_length => {
                    self.discarding = true;
                    self.next_index = 0;
                    return Some(RawLine::TooLong);
                }
                (false, None) => {
                    self.next_index = read_to;
                    return None;
                }
            }
        }
    }
}

impl Default for MetroCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// `None` for a blank line.
fn parse_line(raw: &[u8]) -> Option<Decoded> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    Some(Frame::decode(line))
}

impl Decoder for MetroCodec {
    type Item = Decoded;
    type Error = MetroError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(raw) = self.next_line(src) {
            match raw {
                RawLine::TooLong => {
                    tracing::warn!(max = self.max_length, "skipping over-long line");
                    return Ok(Some(Err(MetroError::LineTooLong)));
                }
                RawLine::Complete(line) => {
                    if let Some(decoded) = parse_line(&line) {
                        return Ok(Some(decoded));
                    }
                }
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(decoded) = self.decode(src)? {
            return Ok(Some(decoded));
        }
        // Unterminated last line.
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }
        let rest = src.split();
        Ok(parse_line(&rest))
    }
}

impl Encoder<Frame> for MetroCodec {
    type Error = MetroError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.encode();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
