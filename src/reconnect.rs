//! Reconnect policy for the initial client connection
//!
//! A bounded retry loop with a fixed delay. Only refused or unreachable
//! connects are retried; every other failure ends the loop at once. The
//! wait between attempts is cancellable.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::AppError;

/// Bounded, fixed-delay retry around connection establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    /// `max_attempts` below one is treated as one
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_attempts, config.retry_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Drive `connect` until it succeeds, fails for good, or is cancelled
    ///
    /// Ends with [`AppError::ConnectRefused`] once `max_attempts` retryable
    /// failures have happened, [`AppError::Connect`] on the first
    /// non-retryable one, and [`AppError::Cancelled`] if `cancel` fires
    /// during an attempt or a wait.
    pub async fn connect_with<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut connect: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let mut attempts = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                result = connect() => result,
            };

            let err = match result {
                Ok(connected) => {
                    debug!("Connected after {} failed attempts", attempts);
                    return Ok(connected);
                }
                Err(err) if is_retryable(&err) => err,
                Err(err) => {
                    error!("Client error: {}", err);
                    return Err(AppError::Connect(err));
                }
            };

            attempts += 1;
            if attempts >= self.max_attempts {
                error!(
                    "Failed to connect to the server after {} attempts",
                    attempts
                );
                return Err(AppError::ConnectRefused {
                    attempts,
                    source: err,
                });
            }

            warn!(
                "Connection attempt {} failed. Retrying in {:?}...",
                attempts, self.delay
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    error!("Interrupted while trying to connect");
                    return Err(AppError::Cancelled);
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }

    /// Connect a TCP stream to `addr` under this policy
    pub async fn connect_tcp(
        &self,
        addr: &str,
        cancel: &CancellationToken,
    ) -> Result<TcpStream, AppError> {
        self.connect_with(cancel, || TcpStream::connect(addr)).await
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Whether a connect failure means "server not there yet"
pub fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn refused() -> io::Error {
        io::Error::from(io::ErrorKind::ConnectionRefused)
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let policy = ReconnectPolicy::new(3, Duration::from_millis(5));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .connect_with(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(refused()) }
            })
            .await;

        assert!(matches!(
            result,
            Err(AppError::ConnectRefused { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connects_on_last_attempt() {
        let policy = ReconnectPolicy::new(3, Duration::from_millis(5));
        let calls = AtomicU32::new(0);

        let result = policy
            .connect_with(&CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(refused())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_aborts_immediately() {
        let policy = ReconnectPolicy::new(5, Duration::from_millis(5));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .connect_with(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::from(io::ErrorKind::PermissionDenied)) }
            })
            .await;

        assert!(matches!(result, Err(AppError::Connect(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_delay() {
        let policy = ReconnectPolicy::new(5, Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result: Result<(), _> = policy
            .connect_with(&cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(refused()) }
            })
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let policy = ReconnectPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> = policy
            .connect_with(&cancel, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&refused()));
        assert!(is_retryable(&io::Error::from(io::ErrorKind::HostUnreachable)));
        assert!(!is_retryable(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_retryable(&io::Error::from(io::ErrorKind::InvalidInput)));
    }

    #[test]
    fn test_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay(), Duration::from_secs(2));
        assert_eq!(ReconnectPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
