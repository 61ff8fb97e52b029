//! Stream load errors and their delivery classification.

use batch_sink::DeliveryError;
use thiserror::Error;

/// Stream load errors.
#[derive(Error, Debug)]
pub enum StreamLoadError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),

    /// Could not connect to the endpoint.
    #[error("Cannot reach {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {endpoint} timed out after {secs} seconds")]
    Timeout { endpoint: String, secs: u64 },

    /// Every configured node refused the connection.
    #[error("No reachable node among: {0}")]
    NoReachableNode(String),

    /// Non-success HTTP status.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The server answered but did not load the batch.
    #[error("Load {status} at {endpoint}: {message}")]
    Load {
        endpoint: String,
        status: String,
        message: String,
    },

    #[error("Too many redirects from {endpoint} (limit {limit})")]
    TooManyRedirects { endpoint: String, limit: u32 },

    #[error("Protocol error from {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },
}

/// Result type for stream load operations.
pub type StreamLoadResult<T> = Result<T, StreamLoadError>;

impl From<StreamLoadError> for DeliveryError {
    fn from(err: StreamLoadError) -> Self {
        match err {
            StreamLoadError::Connect { .. } | StreamLoadError::NoReachableNode(_) => {
                DeliveryError::Unreachable(err.to_string())
            }
            StreamLoadError::Timeout { secs, .. } => DeliveryError::Timeout(secs),
            StreamLoadError::Status {
                status,
                ref endpoint,
                ref body,
            } => {
                if status >= 500 || status == 429 {
                    DeliveryError::Unavailable {
                        status,
                        message: body.clone(),
                    }
                } else {
                    DeliveryError::Rejected {
                        endpoint: endpoint.clone(),
                        message: format!("HTTP {}: {}", status, body),
                    }
                }
            }
            StreamLoadError::Load {
                endpoint,
                status,
                message,
            } => DeliveryError::Rejected {
                endpoint,
                message: format!("{}: {}", status, message),
            },
            StreamLoadError::TooManyRedirects { .. } | StreamLoadError::Protocol { .. } => {
                DeliveryError::Protocol(err.to_string())
            }
            StreamLoadError::Config(_) | StreamLoadError::Client(_) => {
                DeliveryError::Protocol(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_sink::FailureClass;

    fn status(code: u16) -> StreamLoadError {
        StreamLoadError::Status {
            endpoint: "fe:8030".into(),
            status: code,
            body: "x".into(),
        }
    }

    #[test]
    fn test_server_errors_and_throttling_are_transient() {
        for code in [500, 502, 503, 429] {
            let err = DeliveryError::from(status(code));
            assert_eq!(err.class(), FailureClass::Transient, "status {}", code);
        }
    }

    #[test]
    fn test_client_errors_are_fatal() {
        for code in [400, 401, 403, 404] {
            let err = DeliveryError::from(status(code));
            assert!(matches!(err, DeliveryError::Rejected { .. }), "status {}", code);
        }
    }

    #[test]
    fn test_load_failure_keeps_server_message() {
        let err = DeliveryError::from(StreamLoadError::Load {
            endpoint: "be:8040".into(),
            status: "Fail".into(),
            message: "too many filtered rows".into(),
        });

        assert_eq!(err.class(), FailureClass::Fatal);
        assert!(err.to_string().contains("too many filtered rows"));
    }

    #[test]
    fn test_timeout_and_unreachable_are_transient() {
        let timeout = DeliveryError::from(StreamLoadError::Timeout {
            endpoint: "fe:8030".into(),
            secs: 30,
        });
        assert_eq!(timeout, DeliveryError::Timeout(30));

        let none = DeliveryError::from(StreamLoadError::NoReachableNode("fe1, fe2".into()));
        assert_eq!(none.class(), FailureClass::Transient);
    }

    #[test]
    fn test_protocol_errors_are_fatal() {
        let err = DeliveryError::from(StreamLoadError::Protocol {
            endpoint: "fe:8030".into(),
            message: "not json".into(),
        });
        assert!(matches!(err, DeliveryError::Protocol(_)));
    }
}
