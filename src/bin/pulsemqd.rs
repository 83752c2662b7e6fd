//! PulseMQ bus daemon.
//!
//! Loads configuration from an optional TOML file, applies flag overrides,
//! and serves the bus until interrupted. Exits non-zero on bind failure.

use clap::Parser;

use pulsemq::config::{load_config, Config};

#[derive(Debug, Parser)]
#[command(name = "pulsemqd", about = "PulseMQ bus daemon")]
struct Cli {
    /// Display version information and exit.
    #[arg(short = 'v', long)]
    version: bool,

    /// Interface and port to bind to.
    #[arg(short, long)]
    bind: Option<String>,

    /// Default log level; RUST_LOG takes precedence.
    #[arg(long)]
    log_level: Option<String>,

    /// Path to configuration file (TOML).
    #[arg(long)]
    config: Option<String>,

    /// Default topic TTL in milliseconds.
    #[arg(long)]
    ttl: Option<u64>,

    /// Capacity of each subscriber's outbound channel.
    #[arg(long)]
    buffer_length: Option<usize>,

    /// Capacity of each topic's pull queue; overflow drops the head.
    #[arg(long)]
    max_queue_size: Option<usize>,

    /// Hard cap on publish body length in bytes.
    #[arg(long)]
    max_payload_size: Option<usize>,

    /// Enable the metrics facade.
    #[arg(long)]
    metrics: bool,

    /// Address for the metrics listener, e.g. 127.0.0.1:9100.
    #[arg(long)]
    metrics_bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", pulsemq::full_version());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    if let Some(level) = cli.log_level {
        config.server.log_level = level;
    }
    if let Some(ttl) = cli.ttl {
        config.bus.default_ttl_ms = ttl;
    }
    if let Some(len) = cli.buffer_length {
        config.bus.buffer_length = len;
    }
    if let Some(size) = cli.max_queue_size {
        config.bus.max_queue_size = size;
    }
    if let Some(size) = cli.max_payload_size {
        config.bus.max_payload_size = size;
    }
    if cli.metrics {
        config.bus.metrics = true;
    }
    if let Some(addr) = cli.metrics_bind {
        config.server.metrics_bind_addr = Some(addr);
    }

    pulsemq::logging::init_logging(&config.server.log_level);

    pulsemq::run(config).await
}
