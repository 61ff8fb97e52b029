//! Error types for the Redis channel.

use batch_sink::ChannelError;
use thiserror::Error;

/// Redis channel errors.
#[derive(Error, Debug)]
pub enum RedisChannelError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for Redis channel operations.
pub type RedisChannelResult<T> = Result<T, RedisChannelError>;

impl RedisChannelError {
    /// Whether this error came from the connection rather than from Redis itself.
    pub fn is_connection_error(&self) -> bool {
        match self {
            RedisChannelError::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<RedisChannelError> for ChannelError {
    fn from(err: RedisChannelError) -> Self {
        if err.is_connection_error() {
            ChannelError::Unavailable(err.to_string())
        } else {
            ChannelError::Backend(err.to_string())
        }
    }
}
