//! Interruptible pauses and worker stop behaviour.

use super::harness::{build_cycle, fast_options, DeliveryResponse, FaultyChannel};
use crate::cycle::CycleStatus;
use crate::error::{DeliveryError, SinkError};
use crate::options::SinkOptions;
use crate::worker::SinkWorker;
use std::time::{Duration, Instant};

fn slow_options(batch_size: usize) -> SinkOptions {
    let mut options = SinkOptions::new(batch_size);
    options.flush_interval_ms = 60_000;
    options.backoff.initial_ms = 60_000;
    options.backoff.max_ms = 60_000;
    options
}

#[tokio::test]
async fn test_worker_stops_promptly_during_backoff() {
    let t = build_cycle(FaultyChannel::new(8), slow_options(10));
    let shutdown = t.shutdown.clone();
    let counters = t.counters.clone();

    let mut worker = SinkWorker::new("idle-worker", t.cycle);
    let handle = tokio::spawn(async move { worker.run().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.batch_empty, 1);
    assert!(snapshot.started_at.is_some());
    assert!(snapshot.stopped_at.is_some());
}

#[tokio::test]
async fn test_flush_interval_is_cut_short_by_shutdown() {
    let mut t = build_cycle(FaultyChannel::with_records(["a"]), slow_options(10));
    let shutdown = t.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
    });

    let status = tokio::time::timeout(Duration::from_secs(5), t.cycle.process())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(status, CycleStatus::Ready);
    assert_eq!(t.counters.drain_success(), 1);
}

#[tokio::test]
async fn test_no_cycle_starts_after_shutdown() {
    let t = build_cycle(FaultyChannel::with_records(["a"]), fast_options(10));
    t.shutdown.trigger();
    let channel = t.channel.clone();

    let mut worker = SinkWorker::new("stopped", t.cycle);
    worker.run().await.unwrap();

    assert_eq!(channel.log().begins, 0);
    assert_eq!(channel.remaining().await, vec!["a"]);
}

#[tokio::test]
async fn test_fatal_cleanup_interrupted_by_shutdown() {
    let mut options = slow_options(10);
    options.flush_interval_ms = 60_000;
    let mut t = build_cycle(FaultyChannel::with_records(["a"]), options);
    t.delivery.queue_response(DeliveryResponse::Fail(DeliveryError::Protocol(
        "not json".into(),
    )));
    t.shutdown.trigger();

    let err = tokio::time::timeout(Duration::from_secs(5), t.cycle.process())
        .await
        .unwrap()
        .unwrap_err();

    match err {
        SinkError::Cleanup { source, original } => {
            assert!(matches!(*source, SinkError::Interrupted));
            assert!(matches!(
                *original,
                SinkError::Delivery(DeliveryError::Protocol(_))
            ));
        }
        other => panic!("expected cleanup error, got {other:?}"),
    }
    assert_eq!(t.channel.remaining().await, vec!["a"]);
}

#[tokio::test]
async fn test_stop_on_fatal_ends_worker_with_error() {
    let mut options = fast_options(10);
    options.stop_on_fatal = true;
    let t = build_cycle(FaultyChannel::with_records(["a"]), options);
    t.delivery.queue_response(DeliveryResponse::Fail(DeliveryError::Rejected {
        endpoint: "fe".into(),
        message: "bad".into(),
    }));
    let counters = t.counters.clone();

    let mut worker = SinkWorker::new("strict", t.cycle);
    let result = tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .unwrap();

    assert!(matches!(result, Err(SinkError::Delivery(_))));
    assert!(counters.snapshot().stopped_at.is_some());
}

#[tokio::test]
async fn test_worker_keeps_running_after_fatal_without_stop_on_fatal() {
    let t = build_cycle(FaultyChannel::with_records(["a"]), fast_options(10));
    t.delivery.queue_response(DeliveryResponse::Fail(DeliveryError::Rejected {
        endpoint: "fe".into(),
        message: "bad".into(),
    }));
    let shutdown = t.shutdown.clone();
    let counters = t.counters.clone();

    let mut worker = SinkWorker::new("lenient", t.cycle);
    let handle = tokio::spawn(async move { worker.run().await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while counters.drain_success() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    shutdown.trigger();

    handle.await.unwrap().unwrap();
    assert_eq!(t.delivery.call_count(), 2);
}

#[tokio::test]
async fn test_in_flight_delivery_finishes_before_worker_stops() {
    let t = build_cycle(FaultyChannel::with_records(["a", "b"]), fast_options(10));
    t.delivery
        .queue_response(DeliveryResponse::DelayThenAccept(Duration::from_millis(100)));
    let shutdown = t.shutdown.clone();
    let channel = t.channel.clone();
    let counters = t.counters.clone();

    let mut worker = SinkWorker::new("draining", t.cycle);
    let handle = tokio::spawn(async move { worker.run().await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.trigger();
    handle.await.unwrap().unwrap();

    assert_eq!(counters.drain_success(), 2);
    assert!(channel.inner.is_drained());
}
