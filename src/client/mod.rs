//! Client for a running bus: request/response publish and pull, plus a
//! reconnecting streaming subscription.
//!
//! Publish and pull surface failures as [`PulseError`]. Streaming failures
//! never reach application code: the subscription redials with exponential
//! backoff and hands every received message to the user handler. Delivery
//! is at-most-once; messages published while disconnected are not replayed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hyper::client::HttpConnector;
use hyper::{Body, Method, Request, StatusCode};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::core::error::PulseError;
use crate::core::message::{now_nanos, Message};
use crate::util::backoff::Backoff;

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(64);

/// Callback invoked for every message received on a subscription.
///
/// Handler errors are logged and do not break the read loop.
pub type MessageHandler =
    Arc<dyn Fn(Message) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

/// Returns the default handler: each message as one JSON line on stdout.
pub fn json_lines_handler() -> MessageHandler {
    Arc::new(|message| {
        let line = serde_json::to_string(&message)?;
        println!("{line}");
        Ok(())
    })
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub reconnect_interval: Duration,
    pub max_reconnect_interval: Duration,
    pub session: SessionConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_interval: DEFAULT_MAX_RECONNECT_INTERVAL,
            session: SessionConfig::default(),
        }
    }
}

/// Handle on a bus reachable at an HTTP base URL.
#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    http: hyper::Client<HttpConnector>,
    options: ClientOptions,
}

impl Client {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_options(url, ClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: ClientOptions) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Client {
            url,
            http: hyper::Client::new(),
            options,
        }
    }

    /// Publishes `payload` to `topic` and checks the acknowledgement.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
    ) -> Result<(), PulseError> {
        let url = format!("{}/{}", self.url, topic);
        let request = Request::builder()
            .method(Method::PUT)
            .uri(url.as_str())
            .body(Body::from(payload.into()))
            .map_err(|_| PulseError::InvalidUrl(url.clone()))?;

        let response = self.http.request(request).await?;
        if response.status() != StatusCode::OK {
            return Err(PulseError::UnexpectedStatus(response.status().as_u16()));
        }

        let body = hyper::body::to_bytes(response.into_body()).await?;
        if !is_publish_ack(&body) {
            return Err(PulseError::UnexpectedResponse(
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }
        Ok(())
    }

    /// Pulls the head of `topic`'s queue; `Ok(None)` when the queue is empty.
    pub async fn pull(&self, topic: &str) -> Result<Option<Message>, PulseError> {
        let url = format!("{}/{}", self.url, topic);
        let request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .body(Body::empty())
            .map_err(|_| PulseError::InvalidUrl(url.clone()))?;

        let response = self.http.request(request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let body = hyper::body::to_bytes(response.into_body()).await?;
                let message: Message = serde_json::from_slice(&body)?;
                Ok(Some(message))
            }
            status => Err(PulseError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// Creates a streaming subscription on `topic`; call
    /// [`Subscription::start`] to begin receiving.
    pub fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<Subscription, PulseError> {
        let ws_url = websocket_url(&self.url, topic)?;
        Ok(Subscription::new(ws_url, handler, self.options.clone()))
    }
}

/// The acknowledgement body must read
/// `message successfully published to <word> with sequence <digits>`.
fn is_publish_ack(body: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };
    let Some(rest) = text.strip_prefix("message successfully published to ") else {
        return false;
    };
    let Some((topic, seq)) = rest.split_once(" with sequence ") else {
        return false;
    };
    let seq = seq.trim_end();
    !topic.is_empty()
        && topic.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !seq.is_empty()
        && seq.chars().all(|c| c.is_ascii_digit())
}

/// Derives the streaming URL: `http` → `ws`, `https` → `wss`, plus the topic.
fn websocket_url(base: &str, topic: &str) -> Result<String, PulseError> {
    let derived = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(PulseError::InvalidUrl(base.to_string()));
    };
    Ok(format!("{derived}/{topic}"))
}

enum SessionEnd {
    Stopped,
    Disconnected,
}

/// A reconnecting streaming subscription.
///
/// `start` launches the reconnect loop; `stop` sends a normal close frame
/// and prevents further redials. The backoff schedule spans the whole
/// subscription lifetime: it is not reset by a successful connect.
pub struct Subscription {
    ws_url: String,
    handler: MessageHandler,
    options: ClientOptions,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    fn new(ws_url: String, handler: MessageHandler, options: ClientOptions) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Subscription {
            ws_url,
            handler,
            options,
            stop_tx,
            task: Mutex::new(None),
        }
    }

    /// Launches the reconnect loop; a second call is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock().expect("subscription lock poisoned");
        if task.is_some() {
            return;
        }
        let worker = Worker {
            ws_url: self.ws_url.clone(),
            handler: Arc::clone(&self.handler),
            options: self.options.clone(),
            stop: self.stop_tx.subscribe(),
        };
        *task = Some(tokio::spawn(worker.run()));
    }

    /// Closes the connection and ends the reconnect loop.
    pub async fn stop(&self) {
        info!(url = %self.ws_url, "stopping subscription");
        let _ = self.stop_tx.send(true);
        let task = self.task.lock().expect("subscription lock poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

struct Worker {
    ws_url: String,
    handler: MessageHandler,
    options: ClientOptions,
    stop: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        let mut backoff = Backoff::new(
            self.options.reconnect_interval,
            self.options.max_reconnect_interval,
        );

        loop {
            if *self.stop.borrow() {
                return;
            }

            // The delay applies before every dial, including the first.
            let delay = backoff.next_delay();
            debug!(url = %self.ws_url, ?delay, "dialing after backoff");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.stop.changed() => return,
            }

            let mut ws_config = WebSocketConfig::default();
            ws_config.max_message_size = Some(self.options.session.max_frame_size);
            let connect = connect_async_with_config(self.ws_url.as_str(), Some(ws_config), false);
            let stream = match connect.await {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    warn!(url = %self.ws_url, error = %e, "error connecting");
                    continue;
                }
            };
            info!(url = %self.ws_url, "successfully connected");

            match self.run_session(stream).await {
                SessionEnd::Stopped => return,
                SessionEnd::Disconnected => continue,
            }
        }
    }

    /// Drives one live connection: ping pump, pong deadline, and the read
    /// loop feeding the user handler.
    async fn run_session(
        &mut self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> SessionEnd {
        let session = self.options.session;
        let (mut ws_tx, mut ws_rx) = stream.split();
        let period = session.ping_period();
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut deadline = Instant::now() + session.pong_wait;

        loop {
            tokio::select! {
                _ = self.stop.changed() => {
                    let close = WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    }));
                    let _ = timeout(session.write_wait, ws_tx.send(close)).await;
                    return SessionEnd::Stopped;
                }
                _ = ticker.tick() => {
                    let ping = WsMessage::Ping(now_nanos().to_string().into_bytes());
                    match timeout(session.write_wait, ws_tx.send(ping)).await {
                        Ok(Ok(())) => {}
                        _ => {
                            warn!(url = %self.ws_url, "error sending ping");
                            return SessionEnd::Disconnected;
                        }
                    }
                }
                _ = sleep_until(deadline) => {
                    warn!(url = %self.ws_url, "pong deadline exceeded");
                    return SessionEnd::Disconnected;
                }
                frame = ws_rx.next() => match frame {
                    None => return SessionEnd::Disconnected,
                    Some(Err(e)) => {
                        warn!(url = %self.ws_url, error = %e, "error reading");
                        return SessionEnd::Disconnected;
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<Message>(&text) {
                            Ok(message) => {
                                if let Err(e) = (self.handler)(message) {
                                    warn!(error = %e, "error handling message");
                                }
                            }
                            Err(e) => warn!(error = %e, "undecodable message frame"),
                        }
                    }
                    Some(Ok(WsMessage::Pong(payload))) => {
                        deadline = Instant::now() + session.pong_wait;
                        if let Some(sent) = std::str::from_utf8(&payload)
                            .ok()
                            .and_then(|s| s.parse::<i64>().ok())
                        {
                            let latency = (now_nanos() - sent) as f64 / 1e9;
                            debug!(url = %self.ws_url, latency, "pong");
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => return SessionEnd::Disconnected,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
