//! # Observability
//!
//! Logging initialisation shared by the forwarder binaries.
//!
//! Binaries are **log producers**: they call [`init`] or
//! [`init_with_config`] once at startup and use plain `tracing` macros
//! everywhere else. Where the lines end up is decided here:
//!
//! - with a `log_path`, every event is appended to that file as one JSON
//!   object per line (JSONL), flushed per line so several processes can
//!   share the file
//! - without one, events go to stderr, compact or as JSONL depending on
//!   [`LogFormat`]
//!
//! `RUST_LOG` overrides `default_level` in both cases.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "batch-forwarder".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/var/log/forwarder.jsonl".into()),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//! ```

mod json_layer;
mod writer;

pub use json_layer::{JsonLayer, LogLine};
pub use writer::{default_log_path, JsonlFileWriter, WriterFactory};

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Line format used when logging to stderr only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// The same JSONL entries written to log files.
    Json,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default filter (e.g. "info", "batch_sink=debug").
    /// Overridden by the `RUST_LOG` environment variable.
    pub default_level: String,

    /// Append JSONL to this file instead of writing to stderr.
    pub log_path: Option<PathBuf>,

    /// With a `log_path`, also write compact lines to stderr.
    pub also_stderr: bool,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            format: LogFormat::Compact,
        }
    }
}

/// Failure installing the global subscriber.
#[derive(Error, Debug)]
pub enum ObservabilityError {
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid log filter {filter:?}: {message}")]
    Filter { filter: String, message: String },

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

/// Initialize logging to stderr with default settings.
pub fn init(service_name: &str) -> Result<(), ObservabilityError> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
pub fn init_with_config(config: LogConfig) -> Result<(), ObservabilityError> {
    let filter = build_filter(&config.default_level)?;

    match &config.log_path {
        Some(path) => {
            let writer = JsonlFileWriter::new(path).map_err(|source| {
                ObservabilityError::LogFile {
                    path: path.clone(),
                    source,
                }
            })?;
            let json_layer =
                JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer));

            let stderr_layer = config.also_stderr.then(|| {
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .compact()
                    .with_writer(io::stderr)
            });
            let stderr_filter = build_filter(&config.default_level)?;

            tracing_subscriber::registry()
                .with(json_layer.with_filter(filter))
                .with(stderr_layer.map(|l| l.with_filter(stderr_filter)))
                .try_init()
                .map_err(|e| ObservabilityError::AlreadyInstalled(e.to_string()))?;

            tracing::info!(log_path = %path.display(), "observability initialized");
        }
        None => match config.format {
            LogFormat::Compact => {
                tracing_subscriber::registry()
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_target(true)
                            .compact()
                            .with_writer(io::stderr)
                            .with_filter(filter),
                    )
                    .try_init()
                    .map_err(|e| ObservabilityError::AlreadyInstalled(e.to_string()))?;
            }
            LogFormat::Json => {
                let json_layer = JsonLayer::new(config.service_name.clone(), io::stderr);
                tracing_subscriber::registry()
                    .with(json_layer.with_filter(filter))
                    .try_init()
                    .map_err(|e| ObservabilityError::AlreadyInstalled(e.to_string()))?;
            }
        },
    }

    Ok(())
}

/// `RUST_LOG` when set, otherwise `default_level`.
fn build_filter(default_level: &str) -> Result<EnvFilter, ObservabilityError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_level).map_err(|e| ObservabilityError::Filter {
        filter: default_level.to_string(),
        message: e.to_string(),
    })
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
