use std::collections::VecDeque;

use crate::error::{ChatError, Result};

/// Circular buffer for line-based parsing of a byte stream
///
/// Bytes are kept until a full `\n`-terminated line is present, so frames
/// split across network chunks (including inside a multi-byte UTF-8
/// sequence) are reassembled before decoding.
pub struct CircularLineBuffer {
    buffer: VecDeque<u8>,
}

impl CircularLineBuffer {
    /// Create a new buffer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Add bytes to the buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Extract next line (up to \n) from buffer, trimmed
    /// Returns None if no complete line is available
    pub fn next_line(&mut self) -> Option<Result<String>> {
        let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        Some(decode(line_bytes))
    }

    /// Drain whatever is left as a final unterminated line
    pub fn take_remaining(&mut self) -> Option<Result<String>> {
        if self.buffer.is_empty() {
            return None;
        }
        let line_bytes: Vec<u8> = self.buffer.drain(..).collect();
        Some(decode(line_bytes))
    }

    /// Current buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn decode(line_bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(line_bytes)
        .map(|line| line.trim().to_string())
        .map_err(|e| ChatError::Parse(format!("Invalid UTF-8: {}", e)))
}
