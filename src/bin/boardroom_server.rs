use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use boardroom::engine::GameKind;
use boardroom::server::{run_server, ServerConfig};

const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Parser)]
#[command(name = "boardroom_server")]
#[command(about = "Room-based multiplayer server for Acquire and Splendor", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "SERVER_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// Game variant this deployment serves
    #[arg(long, env = "GAME_VARIANT", value_enum, default_value_t = GameKind::Acquire)]
    game: GameKind,

    /// Optional RNG seed for deterministic runs
    #[arg(long, env = "SERVER_RNG_SEED")]
    rng_seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    run_server(ServerConfig {
        bind: args.bind,
        game: args.game,
        rng_seed: args.rng_seed,
    })
    .await
}
