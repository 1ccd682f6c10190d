//! Line-oriented connection
//!
//! Wraps a raw byte transport into a bidirectional stream of
//! newline-terminated text lines. The read half stays with the owner of
//! the connection; the write half is an [`Endpoint`] that can be cloned
//! and handed to the broadcast registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, SendError};

/// Registry key for one connection, fresh per accept or connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

// Hyphen-free form keeps log lines short
impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0.simple())
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Send-capable half of a connection
///
/// Clones share the same writer. Every write takes the writer lock for
/// the whole line, so lines from concurrent senders never interleave.
/// Once closed, the writer is gone and sends fail with
/// [`SendError::Closed`].
#[derive(Clone)]
pub struct Endpoint {
    id: ConnectionId,
    peer: Arc<str>,
    writer: Arc<Mutex<Option<BoxedWriter>>>,
}

impl Endpoint {
    fn new(id: ConnectionId, peer: Arc<str>, writer: BoxedWriter) -> Self {
        Self {
            id,
            peer,
            writer: Arc::new(Mutex::new(Some(writer))),
        }
    }

    /// Identity of the connection this endpoint belongs to
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address of the connection
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write `line` plus a newline and flush
    pub async fn send_line(&self, line: &str) -> Result<(), SendError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendError::Closed)?;
        write_line(writer, line).await
    }

    /// Write `line` plus a newline, giving up after `limit`
    ///
    /// The limit covers both waiting for the writer lock and the write
    /// itself. A write that times out may have left half a line on the
    /// wire, so the writer is dropped and the endpoint counts as closed
    /// from then on.
    pub async fn send_line_within(&self, line: &str, limit: Duration) -> Result<(), SendError> {
        let deadline = Instant::now() + limit;

        let mut guard = timeout_at(deadline, self.writer.lock())
            .await
            .map_err(|_| SendError::TimedOut)?;
        let writer = guard.as_mut().ok_or(SendError::Closed)?;

        match timeout_at(deadline, write_line(writer, line)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Write to {} timed out, dropping writer", self.peer);
                *guard = None;
                Err(SendError::TimedOut)
            }
        }
    }

    /// Shut down the write side
    ///
    /// Idempotent: closing an already closed endpoint does nothing.
    pub async fn close(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown of {} failed: {}", self.peer, e);
            }
        }
    }

    /// Whether the write side has been closed
    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

async fn write_line(writer: &mut BoxedWriter, line: &str) -> Result<(), SendError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Receive-capable half of a connection
pub struct LineReader {
    reader: BufReader<BoxedReader>,
}

impl LineReader {
    /// Wait for the next full line
    ///
    /// Returns `Ok(None)` once the peer has closed the stream. The line
    /// terminator (`\n` or `\r\n`) is stripped. A final unterminated
    /// line before end of stream is still returned. Bytes that are not
    /// valid UTF-8 become U+FFFD instead of failing the stream.
    pub async fn receive_line(&mut self) -> Result<Option<String>, AppError> {
        let mut raw = Vec::new();
        let read = self.reader.read_until(b'\n', &mut raw).await?;
        if read == 0 {
            return Ok(None);
        }

        if raw.ends_with(b"\n") {
            raw.pop();
            if raw.ends_with(b"\r") {
                raw.pop();
            }
        }
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Ok(Some(line))
    }
}

/// Bidirectional line stream over one transport
pub struct Connection {
    reader: LineReader,
    endpoint: Endpoint,
}

impl Connection {
    /// Wrap arbitrary read and write halves
    pub fn new<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer: Arc<str> = Arc::from(peer.into());
        Self {
            reader: LineReader {
                reader: BufReader::new(Box::new(reader)),
            },
            endpoint: Endpoint::new(ConnectionId::new(), peer, Box::new(writer)),
        }
    }

    /// Wrap an accepted or connected TCP stream
    pub fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, peer)
    }

    pub fn id(&self) -> ConnectionId {
        self.endpoint.id
    }

    pub fn peer(&self) -> &str {
        self.endpoint.peer()
    }

    /// A shared handle to the send side
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// See [`Endpoint::send_line`]
    pub async fn send_line(&self, line: &str) -> Result<(), SendError> {
        self.endpoint.send_line(line).await
    }

    /// See [`LineReader::receive_line`]
    pub async fn receive_line(&mut self) -> Result<Option<String>, AppError> {
        self.reader.receive_line().await
    }

    /// Close the write side; the read side is released on drop
    pub async fn close(&self) {
        self.endpoint.close().await;
    }

    /// Split into independently owned read and write halves
    pub fn into_parts(self) -> (LineReader, Endpoint) {
        (self.reader, self.endpoint)
    }
}
