//! Upstream transactional channel contract.
//!
//! A sink withdraws records inside a transaction. Committing finalizes the
//! withdrawal; rolling back returns every withdrawn record so a later
//! transaction sees it again. `take` returning `None` means "nothing
//! available right now", never an error.

mod memory;

pub use memory::{MemoryChannel, MemoryTransaction};

use crate::error::{ChannelError, ChannelResult};
use async_trait::async_trait;
use std::sync::Arc;

/// An opaque record withdrawn from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    body: Vec<u8>,
}

impl Record {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// A queue that hands out records under transactions.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Transaction handle type.
    type Transaction: Transaction;

    /// Open a new transaction.
    async fn begin(&self) -> ChannelResult<Self::Transaction>;
}

/// One unit of withdrawal.
///
/// Exactly one of `commit` or `rollback` should follow the takes; `close`
/// releases the handle and must be safe to call on every exit path,
/// including after a failed commit or rollback.
#[async_trait]
pub trait Transaction: Send {
    /// Withdraw the next record, or `None` if the channel has nothing more.
    async fn take(&mut self) -> ChannelResult<Option<Record>>;

    /// Finalize every take in this transaction.
    async fn commit(&mut self) -> ChannelResult<()>;

    /// Undo every take in this transaction.
    async fn rollback(&mut self) -> ChannelResult<()>;

    /// Release the transaction.
    async fn close(&mut self) -> ChannelResult<()>;
}

#[async_trait]
impl<C: Channel> Channel for Arc<C> {
    type Transaction = C::Transaction;

    async fn begin(&self) -> ChannelResult<Self::Transaction> {
        (**self).begin().await
    }
}

/// Lifecycle of a transaction handle, shared by channel implementations
/// to reject out-of-order calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
    Closed,
}

impl TransactionState {
    /// Error unless the transaction is still open.
    pub fn ensure_open(self, op: &str) -> ChannelResult<()> {
        if self == TransactionState::Open {
            Ok(())
        } else {
            Err(ChannelError::State(format!(
                "cannot {} a transaction that is {:?}",
                op, self
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_body_roundtrip() {
        let record = Record::new("payload");
        assert_eq!(record.body(), b"payload");
        assert_eq!(record.into_body(), b"payload".to_vec());
    }

    #[test]
    fn test_state_guards() {
        assert!(TransactionState::Open.ensure_open("take").is_ok());
        let err = TransactionState::Committed.ensure_open("take").unwrap_err();
        assert_eq!(
            err,
            ChannelError::State("cannot take a transaction that is Committed".into())
        );
    }
}
