//! Handler lifecycle: idempotent start/stop, fail-fast enqueue outside the
//! running state, and construction-time validation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{mk_msg, recording_sink};
use uplink::egress::MessageSink;
use uplink::message::Priority;
use uplink::qos::{Handler, QosConfig, QosError};

#[tokio::test]
async fn enqueue_before_start_is_rejected() {
    let (sink, _gate) = recording_sink(0);
    let handler = Handler::new(QosConfig::default(), Arc::clone(&sink) as Arc<dyn MessageSink>).unwrap();

    let result = handler.enqueue(mk_msg("event:early", Priority::Low, 8)).await;
    assert!(matches!(result, Err(QosError::Shutdown)));
}

#[tokio::test]
async fn enqueue_after_stop_is_rejected() {
    let (sink, _gate) = recording_sink(0);
    let handler = Handler::new(QosConfig::default(), Arc::clone(&sink) as Arc<dyn MessageSink>).unwrap();

    handler.start().await;
    handler.stop().await;

    let result = handler.enqueue(mk_msg("event:late", Priority::Low, 8)).await;
    assert!(matches!(result, Err(QosError::Shutdown)));
    assert_eq!(sink.attempts(), 0);
}

#[tokio::test]
async fn double_start_double_stop_behaves_like_start_stop() {
    let (sink, _gate) = recording_sink(0);
    let handler = Handler::new(QosConfig::default(), Arc::clone(&sink) as Arc<dyn MessageSink>).unwrap();

    handler.start().await;
    handler.start().await;
    assert!(handler.is_running().await);

    let msg = mk_msg("event:mid", Priority::Medium, 8);
    handler.enqueue(msg).await.unwrap();
    assert!(sink.wait_for_deliveries(1, Duration::from_secs(2)).await);

    handler.stop().await;
    handler.stop().await;
    assert!(!handler.is_running().await);
    assert!(matches!(
        handler.enqueue(mk_msg("event:post", Priority::Low, 8)).await,
        Err(QosError::Shutdown)
    ));
}

#[tokio::test]
async fn handler_can_be_restarted() {
    let (sink, _gate) = recording_sink(0);
    let handler = Handler::new(QosConfig::default(), Arc::clone(&sink) as Arc<dyn MessageSink>).unwrap();

    handler.start().await;
    handler.stop().await;
    handler.start().await;

    let msg = mk_msg("event:second-life", Priority::High, 8);
    let id = msg.id;
    handler.enqueue(msg).await.unwrap();
    assert!(sink.wait_for_deliveries(1, Duration::from_secs(2)).await);
    assert_eq!(sink.delivered().await[0].id, id);

    handler.stop().await;
}

#[tokio::test]
async fn stop_drops_undelivered_messages() {
    let (sink, gate) = recording_sink(0);
    let handler = Handler::new(QosConfig::default(), Arc::clone(&sink) as Arc<dyn MessageSink>).unwrap();
    gate.pause();
    handler.start().await;

    handler.enqueue(mk_msg("event:parked", Priority::Low, 8)).await.unwrap();
    handler.enqueue(mk_msg("event:queued", Priority::Low, 8)).await.unwrap();
    handler.stop().await;
    gate.resume();

    // The parked in-flight delivery runs to completion; the queued message
    // was dropped with the dispatcher.
    assert!(sink.wait_for_deliveries(1, Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.delivered().await.len(), 1);
}

#[test]
fn construction_rejects_invalid_limits_together() {
    let (sink, _gate) = recording_sink(0);
    let err = Handler::new(
        QosConfig {
            max_queue_bytes: 0,
            max_message_bytes: 0,
            prioritize_oldest: false,
        },
        Arc::clone(&sink) as Arc<dyn MessageSink>,
    )
    .unwrap_err();
    match err {
        QosError::InvalidConfig(text) => {
            assert!(text.contains("max_queue_bytes"));
            assert!(text.contains("max_message_bytes"));
        }
        other => panic!("expected InvalidConfig, got {:?}", other),
    }
}

#[test]
fn construction_rejects_message_limit_above_queue_limit() {
    let (sink, _gate) = recording_sink(0);
    let err = Handler::new(
        QosConfig {
            max_queue_bytes: 100,
            max_message_bytes: 200,
            prioritize_oldest: false,
        },
        Arc::clone(&sink) as Arc<dyn MessageSink>,
    )
    .unwrap_err();
    assert!(matches!(err, QosError::InvalidConfig(_)));
}
