//! parlor-relay: WebSocket signaling relay for room-based peer negotiation.
//!
//! Relays small JSON control messages between participants sharing a room
//! and introduces newcomers to whoever is already there. Media never passes
//! through here; the peers negotiate a direct connection between themselves.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use parlor::relay::RelayState;
use parlor::server::RelayServer;

#[derive(Parser)]
#[command(name = "parlor-relay", about = "Signaling relay for parlor rooms")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=info".into()),
        )
        .init();

    let args = Args::parse();
    let state = RelayState::new();

    let addr = format!("{}:{}", args.bind, args.port);
    let server = RelayServer::bind(&addr, state.clone())
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %server.local_addr()?, "parlor-relay listening");

    // Periodic occupancy snapshot.
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let rooms = state.room_count().await;
            let connections = state.connection_count().await;
            tracing::debug!(rooms, connections, "relay stats");
        }
    });

    server.run().await;
    Ok(())
}
