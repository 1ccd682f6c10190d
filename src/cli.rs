//! Command line interface
//!
//! `linechat server` binds the listener; `linechat client` (also the
//! default when no mode is given) connects to it.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    ClientConfig, ServerConfig, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_ATTEMPTS, DEFAULT_SERVER_ADDR,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server and rebroadcast every received line.
    Server(ServerArgs),
    /// Connect to a chat server and exchange lines from the console.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address to bind to.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// Upper bound in milliseconds for one client write during a broadcast.
    #[arg(long, default_value_t = 5000)]
    pub write_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// `host:port` of the chat server.
    #[arg(long, default_value = DEFAULT_SERVER_ADDR)]
    pub server: String,

    /// Connection attempts before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Delay in milliseconds between connection attempts.
    #[arg(long, default_value_t = 2000)]
    pub retry_delay_ms: u64,
}

impl Default for ClientArgs {
    fn default() -> Self {
        let config = ClientConfig::default();
        Self {
            server: config.server,
            max_attempts: config.max_attempts,
            retry_delay_ms: config.retry_delay.as_millis() as u64,
        }
    }
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            listen: args.listen,
            write_timeout: Duration::from_millis(args.write_timeout_ms),
        }
    }
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            server: args.server,
            max_attempts: args.max_attempts,
            retry_delay: Duration::from_millis(args.retry_delay_ms),
            ..ClientConfig::default()
        }
    }
}
