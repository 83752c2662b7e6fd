#[path = "common.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use pulsemq::client::{Client, ClientOptions};
use pulsemq::config::{BusOptions, SessionConfig};
use pulsemq::PulseError;

fn fast_options() -> ClientOptions {
    ClientOptions {
        reconnect_interval: Duration::from_millis(20),
        max_reconnect_interval: Duration::from_millis(200),
        session: SessionConfig::default(),
    }
}

fn bus_options() -> BusOptions {
    BusOptions::default().with_metrics(true)
}

#[tokio::test]
async fn publish_and_pull_round_trip() {
    common::init_logging();
    let (addr, _broker) = common::spawn_bus(bus_options(), SessionConfig::default()).await;
    let client = Client::new(format!("http://{addr}"));

    client.publish("hello", "hello world").await.unwrap();

    let message = client.pull("hello").await.unwrap().unwrap();
    assert_eq!(message.id, 0);
    assert_eq!(message.topic.name, "hello");
    assert_eq!(&message.payload[..], b"hello world");

    assert!(client.pull("hello").await.unwrap().is_none());
}

#[tokio::test]
async fn pull_on_fresh_topic_is_none() {
    common::init_logging();
    let (addr, _broker) = common::spawn_bus(bus_options(), SessionConfig::default()).await;
    let client = Client::new(format!("http://{addr}"));

    assert!(client.pull("nothing-here").await.unwrap().is_none());
}

#[tokio::test]
async fn publish_to_unreachable_bus_is_an_error() {
    common::init_logging();
    let client = Client::new("http://127.0.0.1:1");

    let err = client.publish("hello", "x").await.unwrap_err();
    assert!(matches!(err, PulseError::Request(_)));
}

#[tokio::test]
async fn oversize_publish_surfaces_the_status() {
    common::init_logging();
    let (addr, _broker) =
        common::spawn_bus(bus_options().with_max_payload_size(8), SessionConfig::default()).await;
    let client = Client::new(format!("http://{addr}"));

    let err = client.publish("hello", "x".repeat(64)).await.unwrap_err();
    assert!(matches!(err, PulseError::UnexpectedStatus(413)));
}

#[tokio::test]
async fn subscription_delivers_published_messages() {
    common::init_logging();
    let (addr, broker) = common::spawn_bus(bus_options(), SessionConfig::default()).await;
    let client = Client::with_options(format!("http://{addr}"), fast_options());

    let (tx, rx) = flume::unbounded();
    let subscription = client
        .subscribe(
            "hello",
            Arc::new(move |message| {
                let _ = tx.send(message);
                Ok(())
            }),
        )
        .unwrap();
    subscription.start();
    common::wait_for_subscribers(&broker, 1).await;

    client.publish("hello", "hello world").await.unwrap();

    let received = timeout(Duration::from_secs(5), rx.recv_async())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.id, 0);
    assert_eq!(&received.payload[..], b"hello world");

    subscription.stop().await;
    common::wait_for_subscribers(&broker, 0).await;
}

#[tokio::test]
async fn subscription_reconnects_after_disconnect() {
    common::init_logging();
    let (addr, broker) = common::spawn_bus(bus_options(), SessionConfig::default()).await;
    let client = Client::with_options(format!("http://{addr}"), fast_options());

    let (tx, rx) = flume::unbounded();
    let subscription = client
        .subscribe(
            "again",
            Arc::new(move |message| {
                let _ = tx.send(message);
                Ok(())
            }),
        )
        .unwrap();
    subscription.start();
    common::wait_for_subscribers(&broker, 1).await;

    client.publish("again", "first").await.unwrap();
    let received = timeout(Duration::from_secs(5), rx.recv_async())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.id, 0);

    // Kick every subscriber off; the server itself stays up, so the
    // subscription's backoff loop dials straight back in.
    broker.close();
    common::wait_for_subscribers(&broker, 1).await;

    client.publish("again", "second").await.unwrap();
    let received = timeout(Duration::from_secs(5), rx.recv_async())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.id, 1);
    assert_eq!(&received.payload[..], b"second");

    subscription.stop().await;
}

#[tokio::test]
async fn stopped_subscription_does_not_reconnect() {
    common::init_logging();
    let (addr, broker) = common::spawn_bus(bus_options(), SessionConfig::default()).await;
    let client = Client::with_options(format!("http://{addr}"), fast_options());

    let subscription = client
        .subscribe("quiet", Arc::new(|_message| Ok(())))
        .unwrap();
    subscription.start();
    common::wait_for_subscribers(&broker, 1).await;

    subscription.stop().await;
    common::wait_for_subscribers(&broker, 0).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = broker.metrics().unwrap().snapshot();
    assert_eq!(
        snapshot["bus.subscribers"],
        pulsemq::metrics::MetricValue::Gauge(0)
    );
}
