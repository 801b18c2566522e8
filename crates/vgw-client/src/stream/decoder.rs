//! Newline-delimited JSON frame decoder
//!
//! Splits the event stream into lines and decodes each line as one JSON
//! object. A bad line yields a per-frame error; decoding carries on with
//! the next line.

use serde_json::{Map, Value};
use tracing::trace;

use super::types::DecodeError;
use crate::config::DEFAULT_MAX_FRAME_LEN;

/// Result of decoding one line
pub type Frame = Result<Map<String, Value>, DecodeError>;

/// Frame decoder state, one per connection
#[derive(Debug)]
pub struct FrameDecoder {
    /// Buffer for an incomplete line
    buffer: Vec<u8>,
    /// Longest accepted line
    max_frame_len: usize,
    /// Skipping the remainder of an over-long line
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
            discarding: false,
        }
    }

    /// Feed bytes into the decoder and extract any complete frames
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            self.buffer.extend_from_slice(head);
            let line = std::mem::take(&mut self.buffer);
            if line.len() > self.max_frame_len {
                frames.push(Err(DecodeError::TooLong {
                    limit: self.max_frame_len,
                }));
                continue;
            }
            if let Some(frame) = decode_line(&line) {
                frames.push(frame);
            }
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_frame_len {
                trace!(len = self.buffer.len(), "Discarding over-long frame");
                self.buffer.clear();
                self.discarding = true;
                frames.push(Err(DecodeError::TooLong {
                    limit: self.max_frame_len,
                }));
            }
        }

        frames
    }

    /// Decode whatever is left once the stream has ended.
    ///
    /// A final line without a trailing newline is still a frame.
    pub fn finish(&mut self) -> Option<Frame> {
        let line = std::mem::take(&mut self.buffer);
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        decode_line(&line)
    }

    /// Bytes buffered for an incomplete line
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> Option<Frame> {
    // Handle \r\n line endings
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(_) => {
            return Some(Err(DecodeError::InvalidUtf8 { raw: line.to_vec() }));
        }
    };

    // Blank lines are keepalives
    if text.trim().is_empty() {
        trace!("Keepalive line");
        return None;
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(Ok(map)),
        Ok(_) => Some(Err(DecodeError::NotAnObject {
            raw: text.to_string(),
        })),
        Err(source) => Some(Err(DecodeError::InvalidJson {
            raw: text.to_string(),
            source,
        })),
    }
}
