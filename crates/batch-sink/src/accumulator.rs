//! Bounded batch buffer.

use crate::error::AccumulatorError;
use crate::formatter::{FormattedLine, LINE_TERMINATOR};

/// Accumulates formatted lines for a single delivery call.
///
/// Owned by one cycle at a time; never holds more than `limit` lines.
#[derive(Debug)]
pub struct BatchAccumulator {
    buffer: String,
    lines: usize,
    limit: usize,
}

impl BatchAccumulator {
    /// Create an empty accumulator holding at most `limit` lines.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            lines: 0,
            limit,
        }
    }

    /// Append one line.
    pub fn append(&mut self, line: &FormattedLine) -> Result<(), AccumulatorError> {
        if self.lines >= self.limit {
            return Err(AccumulatorError::Full { limit: self.limit });
        }
        self.buffer.push_str(line.as_str());
        self.lines += 1;
        Ok(())
    }

    /// Number of lines currently held.
    pub fn current_size(&self) -> usize {
        self.lines
    }

    /// Whether no line has been appended since the last reset.
    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// Size of the rendered payload in bytes.
    pub fn payload_len(&self) -> usize {
        self.buffer.len().saturating_sub(LINE_TERMINATOR.len_utf8())
    }

    /// The delivery payload: every line, without the final terminator.
    pub fn render(&self) -> Result<&str, AccumulatorError> {
        if self.lines == 0 {
            return Err(AccumulatorError::Empty);
        }
        self.buffer
            .strip_suffix(LINE_TERMINATOR)
            .ok_or(AccumulatorError::MissingTerminator)
    }

    /// Drop all accumulated content. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.lines = 0;
    }
}
