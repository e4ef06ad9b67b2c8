//! Newline-delimited framing for the ingestion byte stream
//!
//! The transport has no message boundaries of its own, so each record is
//! terminated by `\n`. Bytes after the last delimiter stay buffered until a
//! later read completes them.

use crate::core::DEFAULT_MAX_FRAME_BYTES;

/// Outcome of feeding bytes to the framer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete, non-blank frame without its delimiter
    Complete(Vec<u8>),
    /// A frame exceeded the size limit and was dropped
    Oversized { discarded: usize },
}

/// Splits a byte stream into newline-terminated frames
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    /// Set after an oversized frame until its delimiter arrives
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl LineFramer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
            discarding: false,
        }
    }

    /// Feed a chunk of bytes and collect every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FrameEvent> {
        let mut events = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let line = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            self.buffer.extend_from_slice(line);
            let frame = std::mem::take(&mut self.buffer);

            if frame.len() > self.max_frame_bytes {
                events.push(FrameEvent::Oversized { discarded: frame.len() });
                continue;
            }

            if let Some(frame) = trim_frame(frame) {
                events.push(FrameEvent::Complete(frame));
            }
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_frame_bytes {
                events.push(FrameEvent::Oversized { discarded: self.buffer.len() });
                self.buffer.clear();
                self.discarding = true;
            }
        }

        events
    }

    /// Bytes buffered while waiting for a delimiter
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame, e.g. when a new connection starts
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

/// Strip a trailing carriage return; blank lines yield nothing.
fn trim_frame(mut frame: Vec<u8>) -> Option<Vec<u8>> {
    if frame.last() == Some(&b'\r') {
        frame.pop();
    }
    if frame.iter().all(|b| b.is_ascii_whitespace()) {
        None
    } else {
        Some(frame)
    }
}
