//! Broadcast registry
//!
//! The set of endpoints that receive every broadcast line. This is the
//! only state shared between session tasks.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::connection::{ConnectionId, Endpoint};
use crate::error::SendError;

/// Concurrency-safe set of registered endpoints
///
/// The lock is held only to mutate the map or take a snapshot of it,
/// never across a write to an endpoint.
#[derive(Debug)]
pub struct Registry {
    endpoints: Mutex<HashMap<ConnectionId, Endpoint>>,
    write_timeout: Duration,
}

impl Registry {
    /// Create an empty registry with the given per-endpoint write bound
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            write_timeout,
        }
    }

    /// Add an endpoint; an endpoint with the same id is replaced
    pub async fn register(&self, endpoint: Endpoint) {
        let mut endpoints = self.endpoints.lock().await;
        endpoints.insert(endpoint.id(), endpoint);
        debug!("Registered endpoints: {}", endpoints.len());
    }

    /// Remove an endpoint if present
    ///
    /// Returns whether anything was removed. Removing an unknown id is a
    /// no-op.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut endpoints = self.endpoints.lock().await;
        let removed = endpoints.remove(&id).is_some();
        debug!("Registered endpoints: {}", endpoints.len());
        removed
    }

    /// Deliver `line` to every endpoint registered at the time of the call
    ///
    /// Writes run concurrently, each bounded by the write timeout. A failed
    /// endpoint is logged and skipped; one whose writer is gone after the
    /// attempt (timed out or already closed) is unregistered. Returns how
    /// many endpoints took the line.
    pub async fn broadcast(&self, line: &str) -> usize {
        let targets: Vec<Endpoint> = {
            let endpoints = self.endpoints.lock().await;
            endpoints.values().cloned().collect()
        };

        let results = join_all(targets.iter().map(|endpoint| async move {
            let result = endpoint.send_line_within(line, self.write_timeout).await;
            if let Err(e) = &result {
                warn!("Failed to deliver to {}: {}", endpoint.peer(), e);
            }
            result
        }))
        .await;

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (endpoint, result) in targets.iter().zip(&results) {
            match result {
                Ok(()) => delivered += 1,
                Err(SendError::TimedOut | SendError::Closed) => dead.push(endpoint.id()),
                Err(SendError::Io(_)) => {}
            }
        }

        if !dead.is_empty() {
            let mut endpoints = self.endpoints.lock().await;
            for id in dead {
                if endpoints.remove(&id).is_some() {
                    debug!("Dropped dead endpoint {}", id);
                }
            }
        }

        delivered
    }

    /// Number of registered endpoints
    pub async fn len(&self) -> usize {
        self.endpoints.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.endpoints.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream};

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn pipe(buffer: usize) -> (Connection, DuplexStream) {
        let (near, far) = duplex(buffer);
        let (r, w) = tokio::io::split(near);
        (Connection::new(r, w, "test-peer"), far)
    }

    async fn next_line(far: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        far.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = Registry::new(TIMEOUT);
        let (conn, _far) = pipe(64);

        assert!(registry.is_empty().await);
        registry.register(conn.endpoint()).await;
        registry.register(conn.endpoint()).await;
        assert_eq!(registry.len().await, 1);

        assert!(registry.unregister(conn.id()).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unregister_absent_is_noop() {
        let registry = Registry::new(TIMEOUT);
        assert!(!registry.unregister(ConnectionId::new()).await);

        let (conn, _far) = pipe(64);
        registry.register(conn.endpoint()).await;
        assert!(registry.unregister(conn.id()).await);
        assert!(!registry.unregister(conn.id()).await);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let registry = Registry::new(TIMEOUT);
        let (a, far_a) = pipe(64);
        let (b, far_b) = pipe(64);
        registry.register(a.endpoint()).await;
        registry.register(b.endpoint()).await;

        assert_eq!(registry.broadcast("ping").await, 2);

        assert_eq!(next_line(&mut BufReader::new(far_a)).await, "ping\n");
        assert_eq!(next_line(&mut BufReader::new(far_b)).await, "ping\n");
    }

    #[tokio::test]
    async fn test_broadcast_skips_unregistered() {
        let registry = Registry::new(TIMEOUT);
        let (a, _far_a) = pipe(64);
        let (b, far_b) = pipe(64);
        registry.register(a.endpoint()).await;
        registry.register(b.endpoint()).await;
        registry.unregister(a.id()).await;

        assert_eq!(registry.broadcast("after").await, 1);
        assert_eq!(next_line(&mut BufReader::new(far_b)).await, "after\n");
    }

    #[tokio::test]
    async fn test_failed_endpoint_does_not_abort_broadcast() {
        let registry = Registry::new(TIMEOUT);
        let (closed, _far_closed) = pipe(64);
        let (stalled, _far_stalled) = pipe(4);
        let (healthy, far_healthy) = pipe(64);

        closed.close().await;
        registry.register(closed.endpoint()).await;
        registry.register(stalled.endpoint()).await;
        registry.register(healthy.endpoint()).await;

        // "line-longer-than-four-bytes" never fits the stalled pipe
        assert_eq!(registry.broadcast("line-longer-than-four-bytes").await, 1);
        assert_eq!(
            next_line(&mut BufReader::new(far_healthy)).await,
            "line-longer-than-four-bytes\n"
        );
        assert!(stalled.endpoint().is_closed().await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_timed_out_endpoint_is_unregistered() {
        let registry = Registry::new(Duration::from_millis(50));
        let (stalled, _far_stalled) = pipe(4);
        let (healthy, far_healthy) = pipe(64);
        registry.register(stalled.endpoint()).await;
        registry.register(healthy.endpoint()).await;

        assert_eq!(registry.broadcast("far-too-long-for-the-pipe").await, 1);
        assert!(stalled.endpoint().is_closed().await);
        assert_eq!(registry.len().await, 1);

        // Only the healthy endpoint is targeted from now on
        let mut far_healthy = BufReader::new(far_healthy);
        assert_eq!(next_line(&mut far_healthy).await, "far-too-long-for-the-pipe\n");
        assert_eq!(registry.broadcast("next").await, 1);
        assert_eq!(next_line(&mut far_healthy).await, "next\n");

        // The owning session's own cleanup stays a no-op
        assert!(!registry.unregister(stalled.id()).await);
    }
}
