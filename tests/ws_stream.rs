#[path = "common.rs"]
mod common;

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use pulsemq::config::{BusOptions, SessionConfig};
use pulsemq::metrics::MetricValue;
use pulsemq::Message;

fn options() -> BusOptions {
    BusOptions::default().with_metrics(true)
}

#[tokio::test]
async fn streaming_subscriber_receives_published_messages() {
    common::init_logging();
    let (addr, broker) = common::spawn_bus(options(), SessionConfig::default()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/hello")).await.unwrap();
    common::wait_for_subscribers(&broker, 1).await;

    let msg = broker.new_message("hello", "hello world");
    broker.publish(&msg);

    let frame = timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let WsMessage::Text(text) = frame else {
        panic!("expected text frame, got {frame:?}");
    };
    let received: Message = serde_json::from_str(&text).unwrap();
    assert_eq!(received.id, 0);
    assert_eq!(received.topic.name, "hello");
    assert_eq!(&received.payload[..], b"hello world");

    // The write pump counts the delivery right after the frame goes out.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = broker.metrics().unwrap().snapshot();
        if snapshot["bus.delivered"] == MetricValue::Counter(1) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn fan_out_reaches_every_subscriber() {
    common::init_logging();
    let (addr, broker) = common::spawn_bus(options(), SessionConfig::default()).await;

    let (mut first, _) = connect_async(format!("ws://{addr}/fan")).await.unwrap();
    let (mut second, _) = connect_async(format!("ws://{addr}/fan")).await.unwrap();
    common::wait_for_subscribers(&broker, 2).await;

    let msg = broker.new_message("fan", "to-everyone");
    broker.publish(&msg);

    for ws in [&mut first, &mut second] {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let WsMessage::Text(text) = frame else {
            panic!("expected text frame");
        };
        let received: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(received.id, 0);
        assert_eq!(&received.payload[..], b"to-everyone");
    }
}

#[tokio::test]
async fn pull_queue_and_stream_are_independent() {
    common::init_logging();
    let (addr, broker) = common::spawn_bus(options(), SessionConfig::default()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/both")).await.unwrap();
    common::wait_for_subscribers(&broker, 1).await;

    let msg = broker.new_message("both", "once");
    broker.publish(&msg);

    // The streaming subscriber gets the message...
    let frame = timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(frame, WsMessage::Text(_)));

    // ...and the pull queue still holds its own copy.
    let pulled = broker.pull("both").unwrap();
    assert_eq!(pulled.id, 0);
    assert!(broker.pull("both").is_none());
}

#[tokio::test]
async fn server_heartbeats_and_records_pong_latency() {
    common::init_logging();
    let session = SessionConfig {
        pong_wait: Duration::from_millis(300),
        ..Default::default()
    };
    let (addr, broker) = common::spawn_bus(options(), session).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/beat")).await.unwrap();

    // Keep polling the socket so the automatic pong replies get flushed,
    // then wait for the server to record a latency sample.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let mut saw_ping = false;
    loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no ping/pong round trip within deadline"
        );
        tokio::select! {
            frame = ws.next() => {
                if let Some(Ok(WsMessage::Ping(payload))) = frame {
                    let nanos: i64 = std::str::from_utf8(&payload).unwrap().parse().unwrap();
                    assert!(nanos > 0);
                    saw_ping = true;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(25)) => {}
        }
        if saw_ping {
            let snapshot = broker.metrics().unwrap().snapshot();
            if let MetricValue::Summary(data) = snapshot["client.latency_seconds"] {
                if data.count >= 1 {
                    break;
                }
            }
        }
    }
}

#[tokio::test]
async fn broker_close_sends_a_close_frame() {
    common::init_logging();
    let (addr, broker) = common::spawn_bus(options(), SessionConfig::default()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/bye")).await.unwrap();
    common::wait_for_subscribers(&broker, 1).await;

    broker.close();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let frame = tokio::select! {
            frame = ws.next() => frame,
            _ = tokio::time::sleep_until(deadline) => panic!("no close within deadline"),
        };
        match frame {
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("read error instead of close: {e}"),
        }
    }
}
