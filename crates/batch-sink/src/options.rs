//! Sink options.

use crate::error::{SinkError, SinkResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default separator between the content identifier and the record text.
pub const DEFAULT_SEPARATOR: &str = "|";

/// Backoff applied by the worker after empty or transiently failed cycles.
///
/// The pause starts at `initial_ms`, grows by `increment_ms` after each
/// consecutive backoff and is capped at `max_ms`. A `Ready` cycle resets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// First pause after a run of ready cycles.
    pub initial_ms: u64,
    /// Growth per consecutive backoff.
    pub increment_ms: u64,
    /// Upper bound for a single pause.
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 1000,
            increment_ms: 1000,
            max_ms: 5000,
        }
    }
}

impl BackoffPolicy {
    /// Pause for the `consecutive`-th backoff in a row (1-based).
    pub fn delay(&self, consecutive: u32) -> Duration {
        let steps = u64::from(consecutive.saturating_sub(1));
        let ms = self
            .initial_ms
            .saturating_add(self.increment_ms.saturating_mul(steps))
            .min(self.max_ms);
        Duration::from_millis(ms)
    }

    /// Longest pause this policy produces.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

/// Options governing one sink instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkOptions {
    /// Maximum number of records withdrawn per cycle.
    pub batch_size: usize,

    /// Pause after every successful flush, in milliseconds.
    #[serde(default)]
    pub flush_interval_ms: u64,

    /// Prefix each line with a content hash and the separator.
    #[serde(default)]
    pub unique_event: bool,

    /// Separator between the content hash and the record text.
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Worker backoff policy.
    #[serde(default)]
    pub backoff: BackoffPolicy,

    /// Stop the worker on the first fatal cycle error instead of pausing
    /// and retrying.
    #[serde(default)]
    pub stop_on_fatal: bool,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

impl SinkOptions {
    /// Options with the given batch size and defaults for everything else.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            flush_interval_ms: 0,
            unique_event: false,
            separator: default_separator(),
            backoff: BackoffPolicy::default(),
            stop_on_fatal: false,
        }
    }

    /// Pause applied after every successful flush.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Reject options no cycle can run with.
    pub fn validate(&self) -> SinkResult<()> {
        if self.batch_size == 0 {
            return Err(SinkError::Config("batch_size must be at least 1".into()));
        }
        if self.unique_event && self.separator.is_empty() {
            return Err(SinkError::Config(
                "separator must not be empty when unique_event is enabled".into(),
            ));
        }
        if self.backoff.initial_ms > self.backoff.max_ms {
            return Err(SinkError::Config(format!(
                "backoff.initial_ms ({}) exceeds backoff.max_ms ({})",
                self.backoff.initial_ms, self.backoff.max_ms
            )));
        }
        Ok(())
    }
}
