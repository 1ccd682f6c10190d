//! Server listener
//!
//! Binds the service address and spawns one session task per accepted
//! connection. Only the bind can fail fatally; per-connection problems
//! stay inside their session.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::Registry;

/// Bound chat server
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl ChatServer {
    /// Bind the listener described by `config`
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .map_err(|source| AppError::Bind {
                addr: config.listen.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            registry: Arc::new(Registry::new(config.write_timeout)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared broadcast registry
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections forever
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await;
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Sessions already spawned keep running after the loop stops.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        info!("Chat server started on {:?}", self.listener.local_addr().ok());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Chat server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    self.handle_accept(accepted);
                }
            }
        }
    }

    fn handle_accept(&self, accepted: std::io::Result<(TcpStream, SocketAddr)>) {
        match accepted {
            Ok((stream, addr)) => {
                info!("Client connected: {}", addr);
                let conn = Connection::from_tcp(stream);
                tokio::spawn(handle_connection(conn, Arc::clone(&self.registry)));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ServerConfig {
            listen: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        let server = ChatServer::bind(&config).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert!(server.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_bind_taken_address_fails() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            listen: taken.local_addr().unwrap().to_string(),
            write_timeout: Duration::from_secs(1),
        };

        match ChatServer::bind(&config).await {
            Err(AppError::Bind { addr, .. }) => assert_eq!(addr, config.listen),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("bind should fail on a taken address"),
        }
    }
}
