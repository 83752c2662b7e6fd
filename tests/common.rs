#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use pulsemq::broker::Broker;
use pulsemq::config::{BusOptions, SessionConfig};
use pulsemq::metrics::MetricValue;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        pulsemq::logging::try_init_logging("info");
    });
}

/// Serves a bus on an ephemeral port and returns its address and broker.
pub async fn spawn_bus(options: BusOptions, session: SessionConfig) -> (SocketAddr, Arc<Broker>) {
    let broker = Arc::new(Broker::new(options));
    let app = pulsemq::server::router(Arc::clone(&broker), session);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (addr, broker)
}

/// Polls the subscriber gauge until it reaches `expected`.
pub async fn wait_for_subscribers(broker: &Broker, expected: i64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = broker.metrics().expect("metrics enabled").snapshot();
        if snapshot["bus.subscribers"] == MetricValue::Gauge(expected) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {expected} subscribers"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
