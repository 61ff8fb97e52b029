//! Batch forwarder: Redis stream (or stdin) to stream load, in
//! transactional batches.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  take   ┌──────────────┐  deliver  ┌──────────────────┐
//! │ RedisChannel│ ──────▶ │  SinkWorker  │ ────────▶ │ StreamLoadClient │
//! │ (per worker)│ ◀────── │ (BatchCycle) │           │  (shared, Arc)   │
//! └─────────────┘ commit/ └──────────────┘           └──────────────────┘
//!                 rollback        │
//!                                 ▼
//!                     SinkCounters (shared, Arc)
//! ```
//!
//! # Shutdown
//!
//! Ctrl-C or SIGTERM triggers one [`batch_sink::ShutdownSignal`]. Workers
//! finish the cycle they are in, cut any pause short and exit; the final
//! counter snapshot is logged.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod stdin_source;

pub use config::{ForwarderConfig, Overrides, Source};
pub use error::{ForwarderError, ForwarderResult};
pub use pipeline::{run, run_workers};
