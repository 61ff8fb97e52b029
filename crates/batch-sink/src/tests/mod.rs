//! Batch cycle behaviour tests.
//!
//! - `harness.rs`: fault-injecting channel and recording delivery client
//! - `batching.rs`: full and partial batches, batch bounds and ordering
//! - `backoff.rs`: empty channels, transient failures and worker backoff
//! - `failure.rs`: fatal failures, rollback and redelivery, panics
//! - `formatting.rs`: content ids and empty records flowing through a cycle
//! - `shutdown.rs`: interruptible pauses and worker stop behaviour

mod failure;
pub mod harness;
mod shutdown;
