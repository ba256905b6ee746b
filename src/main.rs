//! Dice Proof Server
//!
//! Serves turn-verified dice rooms over WebSocket.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dice_proof::{
    network::{AuthConfig, DiceServer, RoomManager, ServerConfig},
    FileRoomStore, MemoryRoomStore, ProtocolConfig, RoomStore, SystemClock, VERSION,
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Dice Proof Server v{}", VERSION);

    let protocol = ProtocolConfig::from_env();
    let config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();

    info!(
        max_rerolls = protocol.max_rerolls,
        detection_window_ms = protocol.detection_window_ms,
        commit_reveal_window_ms = protocol.commit_reveal_window_ms,
        "protocol configuration"
    );

    let store: Arc<dyn RoomStore> = match &config.data_dir {
        Some(dir) => {
            let store = FileRoomStore::open(dir)
                .with_context(|| format!("opening data directory {}", dir.display()))?;
            info!("Persisting rooms to {}", dir.display());
            Arc::new(store)
        }
        None => {
            info!("No data directory configured, rooms are kept in memory");
            Arc::new(MemoryRoomStore::new())
        }
    };

    let rooms = Arc::new(RoomManager::new(store, Arc::new(SystemClock), protocol));
    let server = Arc::new(DiceServer::new(config, auth, rooms));

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await.context("server failed")?;
    info!("Server stopped");
    Ok(())
}
