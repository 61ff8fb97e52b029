//! Batch sink: transactional queue-to-bulk-ingest forwarding.
//!
//! Records are withdrawn from an upstream channel inside a transaction,
//! formatted into lines, accumulated into one bounded batch and handed to a
//! delivery client in a single call. The transaction commits only after the
//! delivery succeeded; any failure rolls it back so the channel redelivers
//! the records later.
//!
//! # Core Invariants
//!
//! 1. **At-Least-Once**: a failed delivery always rolls back, so no record is lost
//! 2. **Bounded**: a batch never holds more than `batch_size` records
//! 3. **Whole-Batch**: delivery gets the entire batch or nothing
//! 4. **Responsive**: empty channels and transient failures back off, and every
//!    pause is cut short by shutdown
//!
//! # Architecture
//!
//! ```text
//! Channel --take--> RecordFormatter -> BatchAccumulator -> DeliveryClient
//!    ^                                                          |
//!    |________________ commit / rollback ______________________|
//! ```

pub mod accumulator;
pub mod channel;
pub mod counters;
pub mod cycle;
pub mod delivery;
pub mod error;
pub mod formatter;
pub mod options;
pub mod shutdown;
pub mod worker;

#[cfg(test)]
mod tests;

pub use accumulator::BatchAccumulator;
pub use channel::{Channel, MemoryChannel, MemoryTransaction, Record, Transaction, TransactionState};
pub use counters::{CounterSnapshot, SinkCounters};
pub use cycle::{BatchCycle, CyclePhase, CycleStatus};
pub use delivery::DeliveryClient;
pub use error::{
    AccumulatorError, ChannelError, ChannelResult, DeliveryError, DeliveryResult, FailureClass,
    FormatError, SinkError, SinkResult,
};
pub use formatter::{content_id, Formatted, FormattedLine, RecordFormatter};
pub use options::{BackoffPolicy, SinkOptions};
pub use shutdown::{PauseOutcome, ShutdownSignal};
pub use worker::SinkWorker;
