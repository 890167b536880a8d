use clap::Parser;
use flappy_server::config::{load_balance, ServerConfig};
use flappy_server::error::ServerResult;
use flappy_server::network::Server;
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// UDP port to listen on (falls back to 4321 if missing or invalid)
    port: Option<String>,

    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Simulation ticks per second during a match
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Milliseconds of silence before a player is dropped
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// TOML file overriding the game-balance table
    #[arg(short, long)]
    balance: Option<PathBuf>,
}

/// Parses arguments, binds the socket and serves until Ctrl+C.
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()).await {
        error!(target: "boot", "{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> ServerResult<()> {
    let game = load_balance(args.balance.as_deref())?;

    let config = ServerConfig {
        host: args.host,
        port: ServerConfig::resolve_port(args.port.as_deref()),
        tick_rate: args.tick_rate,
        session_timeout: Duration::from_millis(args.timeout_ms),
        ..ServerConfig::default()
    };

    let server = Server::bind(config, game).await?;

    let token = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "boot", "Received Ctrl+C, shutting down gracefully...");
        }
        token.cancel();
    });

    server.run().await
}
