//! Command-line client for a running PulseMQ bus.
//!
//! Provides `pub`, `pull`, and `sub` commands against the bus URL.

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;

use pulsemq::client::{json_lines_handler, Client};

#[derive(Debug, Parser)]
#[command(
    name = "pulsemq-cli",
    version,
    about = "PulseMQ CLI: pub/pull/sub commands"
)]
struct Cli {
    /// Base URL of the bus.
    #[arg(short, long, default_value = "http://localhost:8000")]
    uri: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Publish a message to a topic
    Pub {
        /// Topic name
        topic: String,
        /// Message payload; read from stdin when omitted
        message: Option<String>,
    },

    /// Pull and display the next message from a topic
    Pull {
        /// Topic name
        topic: String,
    },

    /// Subscribe to a topic and print messages as they arrive
    Sub {
        /// Topic name
        topic: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulsemq::logging::init_logging("info");

    let cli = Cli::parse();
    let client = Client::new(&cli.uri);

    match cli.command {
        Command::Pub { topic, message } => {
            let payload = match message {
                Some(text) => text.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };
            client.publish(&topic, payload).await?;
        }
        Command::Pull { topic } => {
            if let Some(message) = client.pull(&topic).await? {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
        Command::Sub { topic } => {
            let subscription = client.subscribe(&topic, json_lines_handler())?;
            subscription.start();
            tokio::signal::ctrl_c().await?;
            subscription.stop().await;
        }
    }

    Ok(())
}
