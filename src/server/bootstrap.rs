use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::engine::GameKind;
use crate::room::{lifecycle, Registry};
use crate::store::{MemoryStore, RoomStore};

use super::routes::{build_router, AppContext};

const LOG_TARGET: &str = "server::bootstrap";

pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Which rule subsystem this deployment serves; one process hosts one
    /// variant, exactly like the original two-binary split.
    pub game: GameKind,
    /// Fixed RNG seed for reproducible runs; tests inject one, production
    /// leaves it unset.
    pub rng_seed: Option<u64>,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let store: Arc<dyn RoomStore> = Arc::new(MemoryStore::new());
    let registry = Registry::new(Arc::clone(&store), config.rng_seed);

    lifecycle::spawn_daily_sweep(Arc::clone(&registry));

    let ctx = Arc::new(AppContext {
        store,
        registry,
        game: config.game,
    });
    let router = build_router(ctx);
    let make_service = router.into_make_service();

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(
        target = LOG_TARGET,
        %local_addr,
        game = ?config.game,
        "boardroom server listening"
    );

    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")
}

async fn shutdown_signal() {
    use tracing::warn;

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = LOG_TARGET,
            error = %err,
            "failed to install ctrl-c handler"
        );
    }
    info!(target = LOG_TARGET, "shutdown signal received");
}
