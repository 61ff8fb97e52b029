//! Record formatting.
//!
//! Turns a raw record body into one newline-terminated batch line,
//! optionally prefixed with a content-addressed identifier.

use crate::error::FormatError;
use crate::options::SinkOptions;
use md5::{Digest, Md5};

/// Terminator appended to every formatted line.
pub const LINE_TERMINATOR: char = '\n';

/// A single newline-terminated batch line.
///
/// Only the formatter can build one, so every line handed to the
/// accumulator is guaranteed to end with [`LINE_TERMINATOR`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedLine(String);

impl FormattedLine {
    fn terminated(mut text: String) -> Self {
        text.push(LINE_TERMINATOR);
        Self(text)
    }

    /// The line including its terminator.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The line without its terminator.
    pub fn content(&self) -> &str {
        &self.0[..self.0.len() - LINE_TERMINATOR.len_utf8()]
    }

    /// Length in bytes, terminator included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true: a line always carries at least its terminator.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of formatting one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formatted {
    /// The record produced a line.
    Line(FormattedLine),
    /// The record decoded to empty text and contributes nothing.
    Skip,
}

/// Deterministic content-addressed identifier: 32 lowercase hex digits of
/// the MD5 of the decoded text.
pub fn content_id(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))
}

/// Formats record bodies according to the sink options.
#[derive(Debug, Clone)]
pub struct RecordFormatter {
    unique_event: bool,
    separator: String,
}

impl RecordFormatter {
    /// Create a formatter.
    pub fn new(unique_event: bool, separator: impl Into<String>) -> Self {
        Self {
            unique_event,
            separator: separator.into(),
        }
    }

    /// Create a formatter from sink options.
    pub fn from_options(options: &SinkOptions) -> Self {
        Self::new(options.unique_event, options.separator.clone())
    }

    /// Format one record body.
    ///
    /// Empty text is a [`Formatted::Skip`]; bytes that are not valid UTF-8
    /// are an error, never a skip.
    pub fn format(&self, body: &[u8]) -> Result<Formatted, FormatError> {
        let text = std::str::from_utf8(body).map_err(|e| FormatError::Decode {
            offset: e.valid_up_to(),
        })?;

        if text.is_empty() {
            return Ok(Formatted::Skip);
        }

        let line = if self.unique_event {
            let id = content_id(text);
            let mut out = String::with_capacity(id.len() + self.separator.len() + text.len() + 1);
            out.push_str(&id);
            out.push_str(&self.separator);
            out.push_str(text);
            out
        } else {
            text.to_string()
        };

        Ok(Formatted::Line(FormattedLine::terminated(line)))
    }
}
