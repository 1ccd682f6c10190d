//! Line Broadcast Chat Library
//!
//! A TCP chat service where every line a client sends is rebroadcast to
//! all connected clients, the sender included.
//!
//! # Features
//! - Newline-delimited UTF-8 wire format, no envelope
//! - Task-per-connection server with a shared broadcast registry
//! - Per-endpoint write serialization and bounded writes during broadcast
//! - Console client with concurrent send and receive loops
//! - Bounded, cancellable reconnect policy for the initial connect
//!
//! # Architecture
//! - `ChatServer` accepts connections and spawns `handle_connection`
//! - Each session registers its `Endpoint` in the `Registry`, broadcasts
//!   what it reads, and unregisters before closing
//! - The registry lock is never held across a write
//!
//! # Example
//! ```ignore
//! use linechat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind(&ServerConfig::default()).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod reconnect;
pub mod registry;
pub mod server;

// Re-export main types for convenience
pub use client::SessionEnd;
pub use config::{ClientConfig, ServerConfig};
pub use connection::{Connection, ConnectionId, Endpoint, LineReader};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use reconnect::ReconnectPolicy;
pub use registry::Registry;
pub use server::ChatServer;
