//! Server-side state bound to one streaming connection.
//!
//! Each session runs two independent pumps. The read pump enforces liveness:
//! it expects a pong within `pong_wait` and records pong round-trip latency.
//! The write pump owns the socket's sending half: it heartbeats every
//! `ping_period` and frames broker deliveries as JSON text. The pumps never
//! wait on each other, so a stuck writer cannot stall pong processing.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{interval_at, sleep_until, timeout, Instant};
use tracing::{debug, warn};

use crate::broker::Broker;
use crate::config::SessionConfig;
use crate::core::message::{now_nanos, Message};

/// Runs one accepted streaming connection until either pump finishes.
///
/// The subscriber id is the peer's address; teardown unsubscribes
/// idempotently no matter which side ends first.
pub async fn run(
    socket: WebSocket,
    broker: Arc<Broker>,
    config: SessionConfig,
    topic: String,
    peer: SocketAddr,
) {
    let id = peer.to_string();
    let rx = broker.subscribe(&id, &topic);
    debug!(subscriber = %id, topic = %topic, "session started");

    let (ws_tx, ws_rx) = socket.split();
    let mut write_task = tokio::spawn(write_pump(ws_tx, rx, Arc::clone(&broker), config));
    let mut read_task = tokio::spawn(read_pump(ws_rx, Arc::clone(&broker), config, id.clone()));

    tokio::select! {
        _ = &mut read_task => {
            // Unsubscribing closes the channel, which lets the write pump
            // deliver its close frame before exiting.
            broker.unsubscribe(&id, &topic);
            let _ = write_task.await;
        }
        _ = &mut write_task => {
            broker.unsubscribe(&id, &topic);
            read_task.abort();
        }
    }

    debug!(subscriber = %id, topic = %topic, "session ended");
}

/// Heartbeats and delivers until the outbound channel closes or the socket
/// rejects a ping.
///
/// A failed message write counts against `client.errors` and the message is
/// lost; the session itself survives until the read pump notices the peer
/// is gone.
async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    rx: flume::Receiver<Message>,
    broker: Arc<Broker>,
    config: SessionConfig,
) {
    let period = config.ping_period();
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let payload = now_nanos().to_string().into_bytes();
                match timeout(config.write_wait, ws_tx.send(WsMessage::Ping(payload))).await {
                    Ok(Ok(())) => {}
                    _ => {
                        debug!("ping write failed, ending write pump");
                        return;
                    }
                }
            }
            received = rx.recv_async() => match received {
                Ok(message) => {
                    let frame = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "failed to encode message");
                            if let Some(m) = broker.metrics() {
                                m.client_errors.inc();
                            }
                            continue;
                        }
                    };
                    match timeout(config.write_wait, ws_tx.send(WsMessage::Text(frame))).await {
                        Ok(Ok(())) => {
                            if let Some(m) = broker.metrics() {
                                m.delivered.inc();
                            }
                        }
                        _ => {
                            if let Some(m) = broker.metrics() {
                                m.client_errors.inc();
                            }
                        }
                    }
                }
                Err(_) => {
                    // Channel closed: unsubscribed or broker shutdown.
                    let close = WsMessage::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "".into(),
                    }));
                    let _ = timeout(config.write_wait, ws_tx.send(close)).await;
                    return;
                }
            }
        }
    }
}

/// Consumes inbound frames, extending the liveness deadline on each pong.
///
/// The data direction is server-to-client only, so anything that is not a
/// pong or a close is logged and discarded.
async fn read_pump(
    mut ws_rx: SplitStream<WebSocket>,
    broker: Arc<Broker>,
    config: SessionConfig,
    id: String,
) {
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            _ = sleep_until(deadline) => {
                debug!(subscriber = %id, "pong deadline exceeded");
                return;
            }
        };

        match frame {
            None => return,
            Some(Err(e)) => {
                debug!(subscriber = %id, error = %e, "read error");
                return;
            }
            Some(Ok(WsMessage::Pong(payload))) => {
                deadline = Instant::now() + config.pong_wait;
                match std::str::from_utf8(&payload)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                {
                    Some(sent) => {
                        let latency = (now_nanos() - sent) as f64 / 1e9;
                        debug!(subscriber = %id, latency, "pong");
                        if let Some(m) = broker.metrics() {
                            m.latency.observe(latency);
                        }
                    }
                    None => warn!(subscriber = %id, "garbage pong payload"),
                }
            }
            Some(Ok(WsMessage::Close(_))) => {
                debug!(subscriber = %id, "peer sent close");
                return;
            }
            Some(Ok(_)) => {
                debug!(subscriber = %id, "discarding unexpected inbound frame");
            }
        }
    }
}
