//! Configuration for PulseMQ.
//!
//! Loads a structured TOML file into strongly-typed structs (`Config`,
//! `ServerConfig`, `BusConfig`) using `serde` + `toml`. Every field has a
//! default, so a missing file section (or no file at all) yields a working
//! configuration; daemon flags override file values.
//!
//! # Example `pulsemq.toml`
//! ```toml
//! [server]
//! bind_addr         = "127.0.0.1:8000"
//! metrics_bind_addr = "127.0.0.1:9100"
//! log_level         = "info"
//!
//! [bus]
//! default_ttl_ms   = 60_000
//! buffer_length    = 100
//! max_queue_size   = 1_000
//! max_payload_size = 8_192
//! metrics          = true
//! ```

use std::time::Duration;
use std::{fs, path::Path};

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Address for the metrics listener; `None` disables it.
    pub metrics_bind_addr: Option<String>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "127.0.0.1:8000".to_string(),
            metrics_bind_addr: None,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BusConfig {
    /// TTL stamped on topics at creation (advisory, never enforced).
    pub default_ttl_ms: u64,
    /// Capacity of each subscriber's outbound channel.
    pub buffer_length: usize,
    /// Capacity of each topic's pull queue; overflow drops the head.
    pub max_queue_size: usize,
    /// Hard cap on publish body length.
    pub max_payload_size: usize,
    /// Enables the metrics facade.
    pub metrics: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            default_ttl_ms: 60_000,
            buffer_length: 100,
            max_queue_size: 1_000,
            max_payload_size: 8_192,
            metrics: false,
        }
    }
}

impl BusConfig {
    pub fn options(&self) -> BusOptions {
        BusOptions {
            default_ttl: Duration::from_millis(self.default_ttl_ms),
            buffer_length: self.buffer_length,
            max_queue_size: self.max_queue_size,
            max_payload_size: self.max_payload_size,
            with_metrics: self.metrics,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub bus: BusConfig,
}

/// Load configuration from a TOML file into `Config`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(&path)?;
    let cfg: Config = toml::from_str(&raw)?;
    Ok(cfg)
}

/// Broker construction options.
#[derive(Debug, Clone)]
pub struct BusOptions {
    pub default_ttl: Duration,
    pub buffer_length: usize,
    pub max_queue_size: usize,
    pub max_payload_size: usize,
    pub with_metrics: bool,
}

impl Default for BusOptions {
    fn default() -> Self {
        BusConfig::default().options()
    }
}

impl BusOptions {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_buffer_length(mut self, len: usize) -> Self {
        self.buffer_length = len;
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.with_metrics = enabled;
        self
    }
}

/// Wire-level timing shared by server sessions and the client: deadlines,
/// the heartbeat period derived from them, and the inbound frame cap.
///
/// Carried per server/subscription rather than as process globals so two
/// instances in one process can disagree.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Maximum size of an inbound frame.
    pub max_frame_size: usize,
    /// Time allowed to write one frame to the peer.
    pub write_wait: Duration,
    /// Time allowed between pongs before the peer is considered gone.
    pub pong_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_frame_size: 2048,
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    /// Heartbeat period; must be under `pong_wait` so a healthy peer always
    /// answers in time.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}
