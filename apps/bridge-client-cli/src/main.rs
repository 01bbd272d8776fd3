use std::str::FromStr;

use anyhow::Context;
use bridge_client_cli::console;
use bridge_transport::{IrohConnector, PeerConnector, Topic};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Minimal interactive Client: connects to a Host by its base58 server id
/// and relays stdin prompts to it, printing streamed chunks as they
/// arrive. Type `/abort` to cancel the request in flight.
#[derive(Debug, Parser)]
#[command(name = "bridge-client-cli", about = "Client side of the inference bridge")]
struct Cli {
    /// Base58-encoded server id, as printed by the Host's `copy-server-id`.
    server_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bridge_client_cli=info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let topic = Topic::from_str(&cli.server_id).context("invalid server id")?;

    let connector = IrohConnector::bind().await.context("failed to bind transport")?;
    let socket = connector.connect(topic).await.context("failed to connect to host")?;

    let (handle, events) = bridge_client::spawn(socket);
    console::run(tokio::io::stdin(), std::io::stdout(), handle, events).await;

    Ok(())
}
