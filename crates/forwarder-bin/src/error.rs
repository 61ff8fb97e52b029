//! Error types for the forwarder binary.

use thiserror::Error;

/// Forwarder error type.
#[derive(Error, Debug)]
pub enum ForwarderError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (config file, stdin)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(#[from] observability::ObservabilityError),

    /// Redis channel setup failed
    #[error("Redis channel error: {0}")]
    Redis(#[from] redis_channel::RedisChannelError),

    /// Stream load client setup failed
    #[error("Stream load error: {0}")]
    StreamLoad(#[from] stream_load::StreamLoadError),

    /// A worker stopped on a fatal error
    #[error("Sink error: {0}")]
    Sink(#[from] batch_sink::SinkError),

    /// A worker task panicked or was cancelled
    #[error("Worker {name} failed: {message}")]
    Worker { name: String, message: String },
}

/// Result type for forwarder operations.
pub type ForwarderResult<T> = Result<T, ForwarderError>;
