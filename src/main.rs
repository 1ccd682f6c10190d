//! Line broadcast chat - Entry Point
//!
//! Runs either the server (listener + per-connection sessions) or the
//! console client, depending on the selected mode.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use linechat::cli::{Cli, ClientArgs, Command};
use linechat::{client, ChatServer, ClientConfig, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so the client's stdout only carries chat lines
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=linechat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("linechat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Server(args)) => {
            let config = ServerConfig::from(args);
            let server = ChatServer::bind(&config).await?;
            info!("Listening on {}", server.local_addr()?);
            server.run().await;
        }
        Some(Command::Client(args)) => run_client(ClientConfig::from(args)).await?,
        None => run_client(ClientConfig::from(ClientArgs::default())).await?,
    }

    Ok(())
}

/// Run the console client
///
/// The blocking stdin read behind `tokio::io::stdin` cannot be cancelled,
/// so a finished session exits the process instead of waiting on runtime
/// shutdown.
async fn run_client(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Ctrl-C interrupts a pending reconnect wait
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install ctrl-c handler: {}", e);
            return;
        }
        on_ctrl_c.cancel();
    });

    let end = client::run(&config, &cancel).await?;
    info!("Session ended: {:?}", end);
    std::process::exit(0)
}
