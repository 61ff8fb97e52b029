//! Process-wide sink counters.
//!
//! Shared across workers through `Arc`; every mutation is a single atomic
//! add so concurrent sink instances never contend on a lock for counting.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic tallies emitted by batch cycles.
#[derive(Debug)]
pub struct SinkCounters {
    name: String,
    batch_empty: AtomicU64,
    batch_underflow: AtomicU64,
    batch_complete: AtomicU64,
    drain_attempt: AtomicU64,
    drain_success: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
    stopped_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`SinkCounters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub name: String,
    pub batch_empty: u64,
    pub batch_underflow: u64,
    pub batch_complete: u64,
    pub drain_attempt: u64,
    pub drain_success: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl SinkCounters {
    /// Create zeroed counters labelled `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batch_empty: AtomicU64::new(0),
            batch_underflow: AtomicU64::new(0),
            batch_complete: AtomicU64::new(0),
            drain_attempt: AtomicU64::new(0),
            drain_success: AtomicU64::new(0),
            started_at: Mutex::new(None),
            stopped_at: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record that a worker started. The first start wins.
    pub fn start(&self) {
        let mut started = self.started_at.lock();
        if started.is_none() {
            *started = Some(Utc::now());
        }
        *self.stopped_at.lock() = None;
    }

    /// Record that a worker stopped.
    pub fn stop(&self) {
        *self.stopped_at.lock() = Some(Utc::now());
    }

    pub fn increment_batch_empty(&self) -> u64 {
        self.batch_empty.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn increment_batch_underflow(&self) -> u64 {
        self.batch_underflow.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn increment_batch_complete(&self) -> u64 {
        self.batch_complete.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_to_drain_attempt(&self, n: u64) -> u64 {
        self.drain_attempt.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn add_to_drain_success(&self, n: u64) -> u64 {
        self.drain_success.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn batch_empty(&self) -> u64 {
        self.batch_empty.load(Ordering::Relaxed)
    }

    pub fn batch_underflow(&self) -> u64 {
        self.batch_underflow.load(Ordering::Relaxed)
    }

    pub fn batch_complete(&self) -> u64 {
        self.batch_complete.load(Ordering::Relaxed)
    }

    pub fn drain_attempt(&self) -> u64 {
        self.drain_attempt.load(Ordering::Relaxed)
    }

    pub fn drain_success(&self) -> u64 {
        self.drain_success.load(Ordering::Relaxed)
    }

    /// Copy every tally for the metrics collaborator.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            name: self.name.clone(),
            batch_empty: self.batch_empty(),
            batch_underflow: self.batch_underflow(),
            batch_complete: self.batch_complete(),
            drain_attempt: self.drain_attempt(),
            drain_success: self.drain_success(),
            started_at: *self.started_at.lock(),
            stopped_at: *self.stopped_at.lock(),
        }
    }
}
