//! HTTP/WebSocket surface.
//!
//! Maps request verbs and paths onto broker operations: `GET /` lists
//! topics, `POST`/`PUT /<topic>` publishes, `GET /<topic>` pulls one message
//! or, with an upgrade header, hands the connection to a streaming session.
//! Origins are accepted unconditionally; the bus is expected to sit behind
//! operator-controlled network policy.

pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::broker::Broker;
use crate::config::SessionConfig;

/// Shared state behind every handler: the broker plus the session timing
/// parameters applied to upgraded connections.
#[derive(Debug, Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub session: SessionConfig,
}

/// Builds the bus router.
pub fn router(broker: Arc<Broker>, session: SessionConfig) -> Router {
    let state = AppState { broker, session };
    Router::new()
        .route("/", get(list_topics))
        .route(
            "/:topic",
            get(pull_or_upgrade)
                .post(publish)
                .put(publish)
                .delete(delete_topic),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    count_requests,
                )),
        )
        .with_state(state)
}

/// Builds the operator metrics router, served on its own listener so the
/// topic namespace on the bus port stays unshadowed.
pub fn metrics_router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .with_state(broker)
}

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(m) = state.broker.metrics() {
        m.requests.inc();
    }
    next.run(request).await
}

async fn list_topics(State(state): State<AppState>) -> Response {
    json_response(&state.broker.snapshot())
}

async fn publish(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    body: Bytes,
) -> Response {
    let topic = normalize_topic(&topic);
    if topic.is_empty() {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }
    if body.len() > state.broker.options().max_payload_size {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload exceeds max-payload-size",
        )
            .into_response();
    }

    let message = state.broker.new_message(&topic, body);
    state.broker.publish(&message);

    format!(
        "message successfully published to {} with sequence {}",
        topic, message.id
    )
    .into_response()
}

async fn pull_or_upgrade(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let topic = normalize_topic(&topic);
    if topic.is_empty() {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }

    if let Some(ws) = ws {
        let broker = Arc::clone(&state.broker);
        let session = state.session;
        return ws
            .max_message_size(session.max_frame_size)
            .on_upgrade(move |socket| session::run(socket, broker, session, topic, peer));
    }

    match state.broker.pull(&topic) {
        Some(message) => json_response(&message),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn delete_topic() -> impl IntoResponse {
    (StatusCode::NOT_IMPLEMENTED, "Not Implemented")
}

async fn serve_metrics(State(broker): State<Arc<Broker>>) -> Response {
    match broker.metrics_snapshot() {
        Some(snapshot) => json_response(&snapshot),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// The topic name is the URL path with surrounding slashes trimmed.
fn normalize_topic(raw: &str) -> String {
    raw.trim_matches('/').to_string()
}

fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error").into_response(),
    }
}
