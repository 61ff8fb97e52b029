//! Error types for the batch sink.
//!
//! Every failure is classified exactly once, at the boundary that produced
//! it, as either [`FailureClass::Transient`] (roll back and back off) or
//! [`FailureClass::Fatal`] (roll back, clean up and surface to the caller).

use thiserror::Error;

/// Retry classification attached to every sink failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retryable: the cycle rolls back and the caller backs off.
    Transient,
    /// Non-retryable: the cycle rolls back and returns the error.
    Fatal,
}

/// Failure reported by an upstream transactional channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The backing store could not be reached (connection refused, IO error).
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// The channel or the transaction ran out of capacity.
    #[error("Channel capacity exhausted: {0}")]
    Exhausted(String),

    /// A transaction was used out of order (take after commit, etc).
    #[error("Transaction state error: {0}")]
    State(String),

    /// The backing store answered with something we cannot interpret.
    #[error("Channel backend error: {0}")]
    Backend(String),
}

impl ChannelError {
    /// Classify this failure according to the channel contract.
    pub fn class(&self) -> FailureClass {
        match self {
            ChannelError::Unavailable(_) | ChannelError::Exhausted(_) => FailureClass::Transient,
            ChannelError::State(_) | ChannelError::Backend(_) => FailureClass::Fatal,
        }
    }
}

/// Failure reported by a downstream delivery client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// No endpoint accepted the connection.
    #[error("Delivery endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint did not answer within the configured timeout.
    #[error("Delivery timed out after {0} seconds")]
    Timeout(u64),

    /// The endpoint is overloaded or failing (5xx, 429). Safe to retry.
    #[error("Delivery endpoint unavailable ({status}): {message}")]
    Unavailable {
        /// HTTP status or equivalent code.
        status: u16,
        /// Server supplied detail.
        message: String,
    },

    /// The endpoint refused the batch. Retrying the same payload will fail again.
    #[error("Delivery rejected by {endpoint}: {message}")]
    Rejected {
        /// Endpoint that produced the rejection.
        endpoint: String,
        /// Server supplied detail.
        message: String,
    },

    /// The endpoint answered with an unexpected response shape.
    #[error("Delivery protocol error: {0}")]
    Protocol(String),
}

impl DeliveryError {
    /// Classify this failure according to the delivery contract.
    pub fn class(&self) -> FailureClass {
        match self {
            DeliveryError::Unreachable(_)
            | DeliveryError::Timeout(_)
            | DeliveryError::Unavailable { .. } => FailureClass::Transient,
            DeliveryError::Rejected { .. } | DeliveryError::Protocol(_) => FailureClass::Fatal,
        }
    }
}

/// Failure turning a record body into a batch line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The record body is not valid UTF-8.
    #[error("Record is not valid UTF-8 (invalid byte at offset {offset})")]
    Decode {
        /// Offset of the first invalid byte.
        offset: usize,
    },
}

/// Failure mutating or rendering the batch accumulator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    /// Appending would exceed the configured batch size.
    #[error("Batch is full ({limit} lines)")]
    Full {
        /// Configured maximum line count.
        limit: usize,
    },

    /// Render was requested on an empty accumulator.
    #[error("Cannot render an empty batch")]
    Empty,

    /// The buffer does not end with the line terminator appended by the formatter.
    #[error("Batch buffer does not end with a line terminator")]
    MissingTerminator,
}

/// Error returned by one batch cycle or by the worker loop.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Upstream channel failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Downstream delivery failure, surfaced unchanged.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// A record could not be decoded.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Batch buffer invariant violation.
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    /// Invalid sink options.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pause was cut short by the shutdown signal.
    #[error("Interrupted by shutdown")]
    Interrupted,

    /// Rolling back after an earlier failure failed as well.
    #[error("Rollback failed ({source}) after: {original}")]
    Rollback {
        /// The rollback failure.
        source: ChannelError,
        /// The failure that triggered the rollback.
        original: Box<SinkError>,
    },

    /// Cleanup after an earlier failure failed. The cleanup failure is the
    /// reported cause; the original failure is kept alongside it.
    #[error("Cleanup failed ({source}) after: {original}")]
    Cleanup {
        /// The cleanup failure.
        source: Box<SinkError>,
        /// The failure that triggered the cleanup.
        original: Box<SinkError>,
    },
}

impl SinkError {
    /// Classify this failure. Only channel and delivery failures can be
    /// transient; compound failures are always fatal.
    pub fn class(&self) -> FailureClass {
        match self {
            SinkError::Channel(e) => e.class(),
            SinkError::Delivery(e) => e.class(),
            _ => FailureClass::Fatal,
        }
    }

    /// Whether the worker should back off and retry rather than surface the error.
    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Result type for delivery operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
