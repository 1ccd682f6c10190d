//! Per-connection session reader
//!
//! Reads lines from one client and broadcasts each of them. Cleanup
//! always unregisters the endpoint before closing the connection, so a
//! concurrent broadcast never targets a closed endpoint.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::connection::Connection;
use crate::registry::Registry;

/// Run the session for one accepted connection until it ends
///
/// The connection is registered on entry. The loop stops on end of
/// stream or on a transport error; neither is propagated.
pub async fn handle_connection(conn: Connection, registry: Arc<Registry>) {
    let id = conn.id();
    let peer = conn.peer().to_string();
    let (mut reader, endpoint) = conn.into_parts();

    registry.register(endpoint.clone()).await;
    debug!("Session {} registered for {}", id, peer);

    loop {
        match reader.receive_line().await {
            Ok(Some(line)) => {
                info!("Received: {}", line);
                let delivered = registry.broadcast(&line).await;
                debug!("Line from {} delivered to {} endpoints", id, delivered);
            }
            Ok(None) => {
                debug!("Client {} closed the stream", peer);
                break;
            }
            Err(e) => {
                error!("Error handling client {}: {}", peer, e);
                break;
            }
        }
    }

    registry.unregister(id).await;
    endpoint.close().await;

    info!("Client disconnected: {}", peer);
}
