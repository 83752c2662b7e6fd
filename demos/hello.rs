//! Minimal publish/subscribe round-trip against a bus running on
//! localhost:8000. Start one with `cargo run --bin pulsemqd` first.

use std::sync::Arc;
use std::time::Duration;

use pulsemq::client::{Client, ClientOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulsemq::logging::init_logging("info");

    let options = ClientOptions {
        reconnect_interval: Duration::from_millis(100),
        ..Default::default()
    };
    let client = Client::with_options("http://localhost:8000", options);

    let subscription = client.subscribe(
        "hello",
        Arc::new(|message| {
            println!("received: {}", String::from_utf8_lossy(&message.payload));
            Ok(())
        }),
    )?;
    subscription.start();

    // Give the subscription a moment to connect; there is no replay for
    // messages published before it joins.
    tokio::time::sleep(Duration::from_millis(500)).await;

    client.publish("hello", "Hello World").await?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    subscription.stop().await;

    Ok(())
}
