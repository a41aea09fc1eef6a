//! End-to-end through the producer socket: framed messages in over
//! loopback TCP, deliveries out through the sink.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{mk_msg, recording_sink};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use uplink::config::IngressConfig;
use uplink::egress::MessageSink;
use uplink::frame;
use uplink::ingress::ProducerListener;
use uplink::message::Priority;
use uplink::qos::{Handler, QosConfig};

fn test_ingress_config() -> IngressConfig {
    IngressConfig {
        bind: "127.0.0.1:0".to_string(),
        max_frame_bytes: 64 * 1024,
    }
}

#[tokio::test]
async fn producer_frames_reach_the_sink() {
    let (sink, _gate) = recording_sink(0);
    let handler = Arc::new(Handler::new(QosConfig::default(), Arc::clone(&sink) as Arc<dyn MessageSink>).unwrap());
    handler.start().await;

    let listener = ProducerListener::bind(&test_ingress_config(), Arc::clone(&handler))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(listener.run(stop_rx));

    let mut producer = TcpStream::connect(addr).await.unwrap();
    let msg = mk_msg("event:wire", Priority::High, 48);
    let id = msg.id;
    frame::write_frame(&mut producer, &msg).await.unwrap();

    assert!(sink.wait_for_deliveries(1, Duration::from_secs(2)).await);
    let delivered = sink.delivered().await;
    assert_eq!(delivered[0].id, id);
    assert_eq!(delivered[0].priority, Priority::High);

    let _ = stop_tx.send(());
    handler.stop().await;
}

#[tokio::test]
async fn multiple_producers_are_served_concurrently() {
    let (sink, _gate) = recording_sink(0);
    let handler = Arc::new(Handler::new(QosConfig::default(), Arc::clone(&sink) as Arc<dyn MessageSink>).unwrap());
    handler.start().await;

    let listener = ProducerListener::bind(&test_ingress_config(), Arc::clone(&handler))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(listener.run(stop_rx));

    let mut a = TcpStream::connect(addr).await.unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();
    frame::write_frame(&mut a, &mk_msg("event:a", Priority::Low, 8))
        .await
        .unwrap();
    frame::write_frame(&mut b, &mk_msg("event:b", Priority::Low, 8))
        .await
        .unwrap();

    assert!(sink.wait_for_deliveries(2, Duration::from_secs(2)).await);

    let _ = stop_tx.send(());
    handler.stop().await;
}

#[tokio::test]
async fn malformed_frame_closes_the_connection() {
    let (sink, _gate) = recording_sink(0);
    let handler = Arc::new(Handler::new(QosConfig::default(), Arc::clone(&sink) as Arc<dyn MessageSink>).unwrap());
    handler.start().await;

    let listener = ProducerListener::bind(&test_ingress_config(), Arc::clone(&handler))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(listener.run(stop_rx));

    let mut producer = TcpStream::connect(addr).await.unwrap();
    producer.write_all(b"not a frame at all").await.unwrap();

    // The agent drops the connection; our next read sees EOF.
    let mut buf = [0u8; 8];
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match tokio::io::AsyncReadExt::read(&mut producer, &mut buf).await {
                Ok(0) => break true,
                Ok(_) => continue,
                Err(_) => break true,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(closed, "connection should be closed after garbage");
    assert_eq!(sink.attempts(), 0);

    let _ = stop_tx.send(());
    handler.stop().await;
}
