//! In-process transactional channel.

use super::{Channel, Record, Transaction, TransactionState};
use crate::error::{ChannelError, ChannelResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Queue {
    records: VecDeque<Record>,
    /// Records withdrawn by open transactions; they still occupy capacity
    /// until committed so a rollback can always put them back.
    in_flight: usize,
}

#[derive(Debug)]
struct Inner {
    queue: Mutex<Queue>,
    capacity: usize,
    transaction_capacity: usize,
}

/// Bounded in-memory channel with take-list transactions.
///
/// Rolled back records return to the head of the queue in their original
/// order, so redelivery preserves ordering.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    inner: Arc<Inner>,
}

impl MemoryChannel {
    /// Create a channel holding at most `capacity` records, of which a
    /// single transaction may withdraw at most `transaction_capacity`.
    pub fn new(capacity: usize, transaction_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(Queue::default()),
                capacity,
                transaction_capacity,
            }),
        }
    }

    /// Enqueue a record at the tail.
    pub fn put(&self, record: Record) -> ChannelResult<()> {
        let mut queue = self.inner.queue.lock();
        if queue.records.len() + queue.in_flight >= self.inner.capacity {
            return Err(ChannelError::Exhausted(format!(
                "memory channel full ({} records)",
                self.inner.capacity
            )));
        }
        queue.records.push_back(record);
        Ok(())
    }

    /// Records waiting to be taken.
    pub fn len(&self) -> usize {
        self.inner.queue.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records withdrawn by transactions that are not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.inner.queue.lock().in_flight
    }

    /// Nothing queued and nothing in flight.
    pub fn is_drained(&self) -> bool {
        let queue = self.inner.queue.lock();
        queue.records.is_empty() && queue.in_flight == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> ChannelResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            inner: self.inner.clone(),
            taken: Vec::new(),
            state: TransactionState::Open,
        })
    }
}

/// Transaction over a [`MemoryChannel`].
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    taken: Vec<Record>,
    state: TransactionState,
}

impl MemoryTransaction {
    fn return_taken(&mut self) {
        if self.taken.is_empty() {
            return;
        }
        let mut queue = self.inner.queue.lock();
        queue.in_flight -= self.taken.len();
        for record in self.taken.drain(..).rev() {
            queue.records.push_front(record);
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn take(&mut self) -> ChannelResult<Option<Record>> {
        self.state.ensure_open("take from")?;
        if self.taken.len() >= self.inner.transaction_capacity {
            return Err(ChannelError::Exhausted(format!(
                "transaction capacity {} reached",
                self.inner.transaction_capacity
            )));
        }

        let mut queue = self.inner.queue.lock();
        let Some(record) = queue.records.pop_front() else {
            return Ok(None);
        };
        queue.in_flight += 1;
        drop(queue);

        self.taken.push(record.clone());
        Ok(Some(record))
    }

    async fn commit(&mut self) -> ChannelResult<()> {
        self.state.ensure_open("commit")?;
        if !self.taken.is_empty() {
            self.inner.queue.lock().in_flight -= self.taken.len();
            self.taken.clear();
        }
        self.state = TransactionState::Committed;
        Ok(())
    }

    async fn rollback(&mut self) -> ChannelResult<()> {
        self.state.ensure_open("roll back")?;
        debug!(records = self.taken.len(), "Returning taken records to memory channel");
        self.return_taken();
        self.state = TransactionState::RolledBack;
        Ok(())
    }

    async fn close(&mut self) -> ChannelResult<()> {
        if self.state == TransactionState::Open && !self.taken.is_empty() {
            warn!(
                records = self.taken.len(),
                "Closing unresolved transaction, rolling back taken records"
            );
            self.return_taken();
        }
        self.state = TransactionState::Closed;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            self.return_taken();
        }
    }
}
