//! Forwarder configuration.
//!
//! Loaded from a JSON file, then overridden by environment variables, then
//! by command line flags. Everything is validated before the first cycle.

use crate::error::{ForwarderError, ForwarderResult};
use batch_sink::SinkOptions;
use observability::LogFormat;
use redis_channel::RedisChannelConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stream_load::StreamLoadConfig;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Overrides `redis.redis_url`.
pub const ENV_REDIS_URL: &str = "FORWARDER_REDIS_URL";
/// Overrides `log_level`.
pub const ENV_LOG_LEVEL: &str = "FORWARDER_LOG_LEVEL";
/// Overrides `stream_load.password`.
pub const ENV_STREAM_LOAD_PASSWORD: &str = "FORWARDER_STREAM_LOAD_PASSWORD";

/// Where records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// One Redis channel per worker.
    Redis,
    /// Lines read from stdin into an in-memory channel.
    Stdin,
}

/// Main forwarder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Batch cycle options.
    pub sink: SinkOptions,

    /// Redis source; required unless reading stdin.
    #[serde(default)]
    pub redis: Option<RedisChannelConfig>,

    /// Delivery target.
    pub stream_load: StreamLoadConfig,

    /// Number of concurrent sink workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append JSONL logs to this file instead of stderr.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// In-memory channel capacity when reading stdin.
    #[serde(default = "default_stdin_capacity")]
    pub stdin_capacity: usize,
}

fn default_workers() -> usize {
    1
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_stdin_capacity() -> usize {
    10_000
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub log_level: Option<String>,
    pub redis_url: Option<String>,
}

impl ForwarderConfig {
    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ForwarderResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForwarderError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: ForwarderConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load a file and apply environment and command line overrides.
    pub fn resolve(path: &Path, overrides: &Overrides) -> ForwarderResult<Self> {
        let mut config = Self::load_from_file(path)?;
        config.load_from_env();
        config.apply_overrides(overrides);
        Ok(config)
    }

    /// Override configuration from environment variables.
    pub fn load_from_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_REDIS_URL) {
            if let Some(redis) = self.redis.as_mut() {
                redis.redis_url = url;
            }
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(password) = lookup(ENV_STREAM_LOAD_PASSWORD) {
            self.stream_load.password = password;
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(level) = &overrides.log_level {
            self.log_level = level.clone();
        }
        if let Some(url) = &overrides.redis_url {
            if let Some(redis) = self.redis.as_mut() {
                redis.redis_url = url.clone();
            }
        }
    }

    /// Check everything needed to run from `source`.
    pub fn validate(&self, source: Source) -> ForwarderResult<()> {
        if self.workers == 0 {
            return Err(ForwarderError::Config(
                "workers must be at least 1".to_string(),
            ));
        }
        self.sink
            .validate()
            .map_err(|e| ForwarderError::Config(format!("sink: {}", e)))?;
        self.stream_load
            .validate_required()
            .map_err(|e| ForwarderError::Config(format!("stream_load: {}", e)))?;

        match source {
            Source::Redis => {
                let redis = self.redis.as_ref().ok_or_else(|| {
                    ForwarderError::Config(
                        "redis section is required unless reading from stdin".to_string(),
                    )
                })?;
                redis
                    .validate()
                    .map_err(|e| ForwarderError::Config(format!("redis: {}", e)))?;
            }
            Source::Stdin => {
                if self.stdin_capacity < self.sink.batch_size {
                    return Err(ForwarderError::Config(format!(
                        "stdin_capacity ({}) must be at least sink.batch_size ({})",
                        self.stdin_capacity, self.sink.batch_size
                    )));
                }
            }
        }
        Ok(())
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.stream_load = self.stream_load.redacted();
        config
    }
}
