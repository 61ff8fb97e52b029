//! Test harness for batch cycle tests.
//!
//! Provides:
//! - FaultyChannel: a MemoryChannel wrapper with injectable failures and a call log
//! - RecordingDelivery: a delivery client that records payloads and replays scripted responses
//! - helpers to build a cycle wired to both

use crate::channel::{Channel, MemoryChannel, MemoryTransaction, Record, Transaction};
use crate::counters::SinkCounters;
use crate::cycle::BatchCycle;
use crate::delivery::DeliveryClient;
use crate::error::{ChannelError, ChannelResult, DeliveryError, DeliveryResult};
use crate::options::SinkOptions;
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Calls observed on a [`FaultyChannel`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLog {
    pub begins: usize,
    pub takes: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
}

/// Failures to inject into the next transaction operations.
#[derive(Debug, Default)]
pub struct Faults {
    pub begin: Option<ChannelError>,
    /// Fail the n-th take (0-based, counted per transaction).
    pub take_at: Option<(usize, ChannelError)>,
    pub panic_on_take_at: Option<usize>,
    pub commit: Option<ChannelError>,
    pub rollback: Option<ChannelError>,
    pub close: Option<ChannelError>,
}

/// MemoryChannel wrapper with fault injection.
#[derive(Clone)]
pub struct FaultyChannel {
    pub inner: MemoryChannel,
    faults: Arc<Mutex<Faults>>,
    log: Arc<Mutex<CallLog>>,
}

impl FaultyChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: MemoryChannel::new(capacity, capacity),
            faults: Arc::new(Mutex::new(Faults::default())),
            log: Arc::new(Mutex::new(CallLog::default())),
        }
    }

    /// Channel pre-filled with the given bodies.
    pub fn with_records<I, B>(bodies: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        let channel = Self::new(1024);
        for body in bodies {
            channel.put(body);
        }
        channel
    }

    pub fn put(&self, body: impl Into<Vec<u8>>) {
        self.inner.put(Record::new(body)).unwrap();
    }

    pub fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap()
    }

    pub fn log(&self) -> CallLog {
        self.log.lock().unwrap().clone()
    }

    /// Bodies still waiting in the channel, head first.
    pub async fn remaining(&self) -> Vec<String> {
        let mut tx = self.inner.begin().await.unwrap();
        let mut out = Vec::new();
        while let Some(record) = tx.take().await.unwrap() {
            out.push(String::from_utf8_lossy(record.body()).to_string());
        }
        tx.rollback().await.unwrap();
        tx.close().await.unwrap();
        out
    }
}

#[async_trait]
impl Channel for FaultyChannel {
    type Transaction = FaultyTransaction;

    async fn begin(&self) -> ChannelResult<FaultyTransaction> {
        if let Some(err) = self.faults().begin.take() {
            return Err(err);
        }
        self.log.lock().unwrap().begins += 1;
        Ok(FaultyTransaction {
            inner: self.inner.begin().await?,
            faults: self.faults.clone(),
            log: self.log.clone(),
            takes: 0,
        })
    }
}

pub struct FaultyTransaction {
    inner: MemoryTransaction,
    faults: Arc<Mutex<Faults>>,
    log: Arc<Mutex<CallLog>>,
    takes: usize,
}

#[async_trait]
impl Transaction for FaultyTransaction {
    async fn take(&mut self) -> ChannelResult<Option<Record>> {
        let n = self.takes;
        self.takes += 1;
        self.log.lock().unwrap().takes += 1;

        let (fail, panic_now) = {
            let mut faults = self.faults.lock().unwrap();
            let fail = match &faults.take_at {
                Some((at, _)) if *at == n => faults.take_at.take().map(|(_, e)| e),
                _ => None,
            };
            let panic_now = faults.panic_on_take_at == Some(n);
            if panic_now {
                faults.panic_on_take_at = None;
            }
            (fail, panic_now)
        };
        if panic_now {
            panic!("injected panic on take {}", n);
        }
        if let Some(err) = fail {
            return Err(err);
        }
        self.inner.take().await
    }

    async fn commit(&mut self) -> ChannelResult<()> {
        self.log.lock().unwrap().commits += 1;
        let fail = self.faults.lock().unwrap().commit.take();
        if let Some(err) = fail {
            return Err(err);
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> ChannelResult<()> {
        self.log.lock().unwrap().rollbacks += 1;
        let fail = self.faults.lock().unwrap().rollback.take();
        if let Some(err) = fail {
            return Err(err);
        }
        self.inner.rollback().await
    }

    async fn close(&mut self) -> ChannelResult<()> {
        self.log.lock().unwrap().closes += 1;
        let fail = self.faults.lock().unwrap().close.take();
        if let Some(err) = fail {
            // Still release the underlying transaction.
            self.inner.close().await?;
            return Err(err);
        }
        self.inner.close().await
    }
}

/// Scripted response of [`RecordingDelivery`].
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum DeliveryResponse {
    Accept,
    Fail(DeliveryError),
    DelayThenAccept(Duration),
    Panic,
}

/// Delivery client that records every payload it is given.
#[derive(Clone, Default)]
pub struct RecordingDelivery {
    payloads: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<VecDeque<DeliveryResponse>>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next delivery; unscripted deliveries accept.
    pub fn queue_response(&self, response: DeliveryResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    /// Every delivered line across all accepted and rejected payloads.
    pub fn lines(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .flat_map(|p| p.split('\n').map(str::to_string).collect::<Vec<_>>())
            .collect()
    }
}

#[async_trait]
impl DeliveryClient for RecordingDelivery {
    async fn deliver(&self, payload: &str) -> DeliveryResult<()> {
        self.payloads.lock().unwrap().push(payload.to_string());
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryResponse::Accept);
        match response {
            DeliveryResponse::Accept => Ok(()),
            DeliveryResponse::Fail(err) => Err(err),
            DeliveryResponse::DelayThenAccept(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            DeliveryResponse::Panic => panic!("injected delivery panic"),
        }
    }
}

/// A cycle plus handles on everything it touches.
pub struct TestCycle {
    pub cycle: BatchCycle<FaultyChannel, RecordingDelivery>,
    pub channel: FaultyChannel,
    pub delivery: RecordingDelivery,
    pub counters: Arc<SinkCounters>,
    pub shutdown: ShutdownSignal,
}

pub fn build_cycle(channel: FaultyChannel, options: SinkOptions) -> TestCycle {
    let delivery = RecordingDelivery::new();
    let counters = Arc::new(SinkCounters::new("test-sink"));
    let shutdown = ShutdownSignal::new();
    let cycle = BatchCycle::new(
        channel.clone(),
        delivery.clone(),
        options,
        counters.clone(),
        shutdown.clone(),
    )
    .unwrap();
    TestCycle {
        cycle,
        channel,
        delivery,
        counters,
        shutdown,
    }
}

/// Options with zero pauses so tests run fast.
pub fn fast_options(batch_size: usize) -> SinkOptions {
    let mut options = SinkOptions::new(batch_size);
    options.backoff.initial_ms = 1;
    options.backoff.increment_ms = 1;
    options.backoff.max_ms = 5;
    options
}

/// Bodies `prefix-0` .. `prefix-(n-1)`.
pub fn numbered(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}-{}", prefix, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_faulty_channel_injects_once() {
        let channel = FaultyChannel::with_records(["a", "b"]);
        channel.faults().take_at = Some((0, ChannelError::Unavailable("down".into())));

        let mut tx = channel.begin().await.unwrap();
        assert!(tx.take().await.is_err());
        assert_eq!(tx.take().await.unwrap(), Some(Record::new("a")));
        tx.rollback().await.unwrap();
        tx.close().await.unwrap();

        assert_eq!(channel.remaining().await, vec!["a", "b"]);
        assert_eq!(channel.log().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_recording_delivery_replays_script() {
        let delivery = RecordingDelivery::new();
        delivery.queue_response(DeliveryResponse::Fail(DeliveryError::Timeout(1)));

        assert!(delivery.deliver("x").await.is_err());
        assert!(delivery.deliver("y\nz").await.is_ok());
        assert_eq!(delivery.lines(), vec!["x", "y", "z"]);
    }
}
