//! Error types for the chat service
//!
//! Defines application-level errors and endpoint send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Transport errors only ever end the session they happened on.
/// Bind errors are fatal for the server process; the connect variants
/// end the client before a session starts.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O failure on an established connection
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Listener could not acquire its address (fatal)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Server refused or was unreachable on every attempt
    #[error("failed to connect to the server after {attempts} attempts")]
    ConnectRefused {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Connect failure that is not worth retrying
    #[error("client error: {0}")]
    Connect(std::io::Error),

    /// Reconnect loop interrupted by a shutdown request
    #[error("interrupted while trying to connect")]
    Cancelled,
}

/// Endpoint send errors
#[derive(Debug, Error)]
pub enum SendError {
    /// The endpoint's write side has already been closed
    #[error("connection closed")]
    Closed,

    /// The write did not complete within the broadcast write timeout
    #[error("write timed out")]
    TimedOut,

    /// The peer reset the stream or the write failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
