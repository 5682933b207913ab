//! Delimiter-based framing for TCP streams
//!
//! Tracker protocols in the TK-102 family send ASCII frames terminated by a
//! single `;` byte, with no length prefix and no escaping:
//!
//! ```text
//! ##,imei:123456789012345,A;123456789012345;imei:1234...;
//! ```
//!
//! TCP delivers these as arbitrarily sized chunks, so the framer buffers
//! trailing bytes until the next delimiter arrives.

use thiserror::Error;

/// Byte that terminates every frame
pub const FRAME_DELIMITER: u8 = b';';

/// Maximum bytes buffered while waiting for a delimiter
///
/// The wire format never produces frames anywhere near this long; a peer
/// that exceeds it is misbehaving and its session is dropped.
pub const MAX_FRAME_LEN: usize = 1024;

/// Errors that can occur while framing a stream
#[derive(Error, Debug)]
pub enum FramerError {
    #[error("frame exceeds {MAX_FRAME_LEN} bytes without a delimiter")]
    FrameTooLong,
}

/// Accumulates byte chunks and splits them into complete frames
///
/// Frames are emitted in the exact order their delimiters arrive; the
/// delimiter itself is stripped.
#[derive(Debug, Default)]
pub struct Framer {
    /// Bytes after the last delimiter, carried to the next `feed`
    buffer: String,
}

impl Framer {
    /// Create a new framer with an empty carry-over buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk of received bytes, returning all frames it completes
    ///
    /// Whitespace surrounding the chunk is trimmed before splitting. Bytes
    /// after the last delimiter are retained for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, FramerError> {
        let text = String::from_utf8_lossy(chunk);
        self.buffer.push_str(text.trim());

        let mut frames = Vec::new();
        while let Some(index) = self.buffer.find(FRAME_DELIMITER as char) {
            let rest = self.buffer.split_off(index + 1);
            self.buffer.pop(); // delimiter
            frames.push(std::mem::replace(&mut self.buffer, rest));
        }

        if self.buffer.len() > MAX_FRAME_LEN {
            return Err(FramerError::FrameTooLong);
        }

        Ok(frames)
    }

    /// Number of bytes currently buffered waiting for a delimiter
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}
