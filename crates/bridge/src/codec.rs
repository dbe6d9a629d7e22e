//! Newline-delimited JSON framing for the backend stream.
//!
//! The backend speaks a byte stream where every envelope is one line. This
//! codec turns that stream into discrete text frames and back, reassembling
//! lines that arrive split across reads.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use relaychat_protocol::constants::LINE_TERMINATOR;

use crate::BridgeError;

/// Line codec used on both halves of the backend connection.
#[derive(Debug, Clone)]
pub struct JsonLinesCodec {
    max_length: usize,
    /// Where to resume scanning for a terminator on the next call.
    next_index: usize,
}

impl JsonLinesCodec {
    /// Creates a codec that rejects lines longer than `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

/// Converts one raw line (terminator already removed) into a frame.
///
/// A trailing `\r` is stripped and invalid UTF-8 is replaced. Lines that
/// are empty or whitespace-only yield `None`.
fn frame_text(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    if text.trim().is_empty() {
        None
    } else {
        Some(text.into_owned())
    }
}

impl Decoder for JsonLinesCodec {
    type Item = String;
    type Error = BridgeError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, BridgeError> {
        loop {
            let found = buf[self.next_index..]
                .iter()
                .position(|b| *b == LINE_TERMINATOR);

            let Some(offset) = found else {
                if buf.len() > self.max_length {
                    let size = buf.len();
                    buf.clear();
                    self.next_index = 0;
                    return Err(BridgeError::FrameTooLarge {
                        size,
                        max: self.max_length,
                    });
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            let line = buf.split_to(end + 1);
            if end > self.max_length {
                return Err(BridgeError::FrameTooLarge {
                    size: end,
                    max: self.max_length,
                });
            }
            if let Some(text) = frame_text(&line[..end]) {
                return Ok(Some(text));
            }
            // Blank line: keep scanning what is left.
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, BridgeError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        // Unterminated tail at end of stream.
        let rest = buf.split();
        Ok(frame_text(&rest))
    }
}

impl Encoder<String> for JsonLinesCodec {
    type Error = BridgeError;

    fn encode(&mut self, frame: String, dst: &mut BytesMut) -> Result<(), BridgeError> {
        // One client frame must stay one backend line. Raw CR/LF can only
        // appear as insignificant whitespace in JSON, so flatten them.
        let frame = if frame.contains(['\r', '\n']) {
            frame.replace(['\r', '\n'], " ")
        } else {
            frame
        };
        dst.reserve(frame.len() + 1);
        dst.put_slice(frame.as_bytes());
        dst.put_u8(LINE_TERMINATOR);
        Ok(())
    }
}
