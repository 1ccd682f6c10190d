//! Runtime configuration for the server and client roles
//!
//! Both configs carry the service defaults in their `Default` impls;
//! the command line only overrides individual fields.

use std::time::Duration;

/// Default server bind address (all interfaces, port 8000)
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Default address the client connects to
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8000";

/// Default number of connection attempts before the client gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default fixed delay between connection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default upper bound for a single endpoint write during a broadcast
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time the receive loop gets to drain after the user leaves
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Server listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub listen: String,
    /// Upper bound for one endpoint write during a broadcast
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the chat server
    pub server: String,
    /// Maximum connection attempts
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// How long the receive loop may drain after the input loop ends
    pub exit_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER_ADDR.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            exit_grace: DEFAULT_EXIT_GRACE,
        }
    }
}
