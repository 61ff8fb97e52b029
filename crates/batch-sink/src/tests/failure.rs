//! Fatal failures, rollback, redelivery and panics.

use super::harness::{build_cycle, fast_options, numbered, DeliveryResponse, FaultyChannel};
use crate::cycle::{CyclePhase, CycleStatus};
use crate::error::{ChannelError, DeliveryError, FormatError, SinkError};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;

fn rejected() -> DeliveryError {
    DeliveryError::Rejected {
        endpoint: "fe-1:8030".into(),
        message: "column count mismatch".into(),
    }
}

#[tokio::test]
async fn test_fatal_delivery_failure_rolls_back_and_surfaces() {
    let mut t = build_cycle(FaultyChannel::with_records(["a", "b", "c"]), fast_options(10));
    t.delivery.queue_response(DeliveryResponse::Fail(rejected()));

    let err = t.cycle.process().await.unwrap_err();

    assert!(matches!(err, SinkError::Delivery(DeliveryError::Rejected { .. })));
    assert!(!err.is_transient());
    assert_eq!(t.channel.remaining().await, vec!["a", "b", "c"]);
    assert_eq!(t.counters.drain_success(), 0);
    assert_eq!(t.counters.drain_attempt(), 3);
    assert_eq!(t.channel.log().rollbacks, 1);
    assert_eq!(t.channel.log().closes, 1);
    assert_eq!(t.cycle.phase(), CyclePhase::Idle);
}

#[tokio::test]
async fn test_rolled_back_records_are_redelivered_in_order() {
    let bodies = numbered("rec", 4);
    let mut t = build_cycle(FaultyChannel::with_records(bodies.clone()), fast_options(4));
    t.delivery.queue_response(DeliveryResponse::Fail(rejected()));

    assert!(t.cycle.process().await.is_err());
    assert_eq!(t.cycle.process().await.unwrap(), CycleStatus::Ready);

    let payloads = t.delivery.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0], payloads[1]);
    assert_eq!(payloads[1], bodies.join("\n"));
    assert_eq!(t.counters.drain_success(), 4);
}

#[tokio::test]
async fn test_undecodable_record_is_fatal() {
    let channel = FaultyChannel::new(16);
    channel.put("fine");
    channel.put(vec![0x66, 0x6f, 0xff, 0x6f]);
    let mut t = build_cycle(channel, fast_options(10));

    let err = t.cycle.process().await.unwrap_err();

    assert!(matches!(
        err,
        SinkError::Format(FormatError::Decode { offset: 2 })
    ));
    assert_eq!(t.delivery.call_count(), 0);
    assert_eq!(t.channel.inner.len(), 2);
    assert_eq!(t.channel.log().rollbacks, 1);
}

#[tokio::test]
async fn test_fatal_take_failure_is_surfaced() {
    let channel = FaultyChannel::with_records(["a"]);
    channel.faults().take_at = Some((0, ChannelError::Backend("unexpected reply".into())));
    let mut t = build_cycle(channel, fast_options(10));

    let err = t.cycle.process().await.unwrap_err();

    assert!(matches!(err, SinkError::Channel(ChannelError::Backend(_))));
    assert_eq!(t.channel.remaining().await, vec!["a"]);
}

#[tokio::test]
async fn test_fatal_begin_failure_is_surfaced() {
    let channel = FaultyChannel::with_records(["a"]);
    channel.faults().begin = Some(ChannelError::State("closed".into()));
    let mut t = build_cycle(channel, fast_options(10));

    let err = t.cycle.process().await.unwrap_err();

    assert!(matches!(err, SinkError::Channel(ChannelError::State(_))));
    assert_eq!(t.channel.log().closes, 0);
}

#[tokio::test]
async fn test_failed_rollback_wraps_original_error() {
    let channel = FaultyChannel::with_records(["a"]);
    channel.faults().rollback = Some(ChannelError::Unavailable("gone".into()));
    let mut t = build_cycle(channel, fast_options(10));
    t.delivery.queue_response(DeliveryResponse::Fail(DeliveryError::Timeout(30)));

    let err = t.cycle.process().await.unwrap_err();

    match err {
        SinkError::Rollback { source, original } => {
            assert_eq!(source, ChannelError::Unavailable("gone".into()));
            assert!(matches!(
                *original,
                SinkError::Delivery(DeliveryError::Timeout(30))
            ));
        }
        other => panic!("expected rollback error, got {other:?}"),
    }
    // Even a transient original becomes fatal once the rollback fails.
    assert_eq!(t.channel.log().closes, 1);
}

#[tokio::test]
async fn test_close_failure_after_success_is_reported() {
    let channel = FaultyChannel::with_records(["a"]);
    channel.faults().close = Some(ChannelError::Backend("close failed".into()));
    let mut t = build_cycle(channel, fast_options(10));

    let err = t.cycle.process().await.unwrap_err();

    assert!(matches!(err, SinkError::Channel(ChannelError::Backend(_))));
    assert_eq!(t.delivery.payloads(), vec!["a"]);
    assert_eq!(t.counters.drain_success(), 1);
}

#[tokio::test]
async fn test_close_failure_after_error_keeps_original() {
    let channel = FaultyChannel::with_records(["a"]);
    channel.faults().close = Some(ChannelError::Backend("close failed".into()));
    let mut t = build_cycle(channel, fast_options(10));
    t.delivery.queue_response(DeliveryResponse::Fail(rejected()));

    let err = t.cycle.process().await.unwrap_err();

    assert!(matches!(err, SinkError::Delivery(DeliveryError::Rejected { .. })));
}

#[tokio::test]
async fn test_delivery_panic_rolls_back_and_resumes() {
    let mut t = build_cycle(FaultyChannel::with_records(["a", "b"]), fast_options(10));
    t.delivery.queue_response(DeliveryResponse::Panic);

    let outcome = AssertUnwindSafe(t.cycle.process()).catch_unwind().await;

    let panic = outcome.unwrap_err();
    assert_eq!(
        panic.downcast_ref::<&str>().copied(),
        Some("injected delivery panic")
    );
    assert_eq!(t.channel.remaining().await, vec!["a", "b"]);
    let log = t.channel.log();
    assert_eq!(log.rollbacks, 1);
    assert_eq!(log.closes, 1);
    assert_eq!(t.cycle.phase(), CyclePhase::Idle);

    // The cycle is usable again after the panic.
    assert_eq!(t.cycle.process().await.unwrap(), CycleStatus::Ready);
    assert_eq!(t.counters.drain_success(), 2);
}

#[tokio::test]
async fn test_take_panic_rolls_back_partial_withdrawal() {
    let channel = FaultyChannel::with_records(["a", "b", "c"]);
    channel.faults().panic_on_take_at = Some(2);
    let mut t = build_cycle(channel, fast_options(10));

    let outcome = AssertUnwindSafe(t.cycle.process()).catch_unwind().await;

    assert!(outcome.is_err());
    assert_eq!(t.channel.remaining().await, vec!["a", "b", "c"]);
    assert_eq!(t.delivery.call_count(), 0);
}
