//! PulseMQ: a lightweight in-memory pub/sub message bus over HTTP and
//! WebSockets.
//!
//! Publishers POST opaque payloads to named topics; subscribers stream them
//! in real time over a WebSocket or pull them one at a time. Each topic
//! carries a bounded pull queue and an independent set of streaming
//! subscribers, so late subscribers do not replay and slow subscribers lose
//! tail messages instead of stalling publishers.

pub mod broker;
pub mod client;
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod util;

use std::net::SocketAddr;
use std::sync::Arc;

pub use crate::broker::Broker;
pub use crate::client::{Client, ClientOptions, MessageHandler, Subscription};
pub use crate::config::{BusOptions, Config, SessionConfig};
pub use crate::core::error::PulseError;
pub use crate::core::message::Message;
pub use crate::core::topics::Topic;

/// Package name and version as one display string.
pub fn full_version() -> String {
    format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Runs the bus daemon until interrupted.
///
/// Binds the bus listener (and the metrics listener when configured),
/// serves until ctrl-c, then closes the broker so every streaming session
/// receives a clean close frame.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let broker = Arc::new(Broker::new(config.bus.options()));
    let app = server::router(Arc::clone(&broker), SessionConfig::default());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!("{} listening on {}", full_version(), listener.local_addr()?);

    if let Some(addr) = &config.server.metrics_bind_addr {
        let metrics_app = server::metrics_router(Arc::clone(&broker));
        let metrics_listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("metrics listening on {}", metrics_listener.local_addr()?);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
                tracing::error!("metrics server error: {e}");
            }
        });
    }

    let shutdown_broker = Arc::clone(&broker);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_broker.close();
    })
    .await?;

    Ok(())
}
