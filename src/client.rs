//! Chat client session
//!
//! Connects through the reconnect policy, then runs two loops side by
//! side: console input to the server, and server lines to the console.
//! The loops share no flags; closing the connection is the only signal
//! between them.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::connection::{Connection, Endpoint, LineReader};
use crate::error::AppError;
use crate::reconnect::ReconnectPolicy;

/// Greeting printed once the connection is up
pub const WELCOME: &str = "Connected to server. Type your messages (type 'exit' to quit):";

/// Console line that ends the session without being sent
pub const EXIT_COMMAND: &str = "exit";

/// Why a client session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed the exit command
    UserExit,
    /// Console input reached end of file
    InputClosed,
    /// The server closed the stream
    ServerClosed,
    /// The connection failed
    TransportFailed,
    /// Writing to the console failed
    OutputClosed,
}

/// Connect to the configured server and run a console session
pub async fn run(config: &ClientConfig, cancel: &CancellationToken) -> Result<SessionEnd, AppError> {
    let policy = ReconnectPolicy::from_config(config);
    let stream = policy.connect_tcp(&config.server, cancel).await?;
    let conn = Connection::from_tcp(stream);
    info!("Connected to {}", conn.peer());

    let mut stdout = tokio::io::stdout();
    write_console(&mut stdout, WELCOME).await?;

    let stdin = BufReader::new(tokio::io::stdin());
    Ok(run_session(conn, stdin, stdout, config.exit_grace).await)
}

/// Run both loops over an established connection
///
/// When the input loop ends first, the write side is closed and the
/// receive loop gets `exit_grace` to see the server's end of stream.
/// The connection is closed before returning either way.
pub async fn run_session<I, O>(
    conn: Connection,
    input: I,
    output: O,
    exit_grace: Duration,
) -> SessionEnd
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    enum First {
        Input(SessionEnd),
        Receive(SessionEnd),
    }

    let (reader, endpoint) = conn.into_parts();

    let receive = receive_loop(reader, output);
    tokio::pin!(receive);

    let first = tokio::select! {
        end = &mut receive => First::Receive(end),
        end = input_loop(input, &endpoint) => First::Input(end),
    };

    let end = match first {
        First::Receive(end) => end,
        First::Input(end) => {
            endpoint.close().await;
            if timeout(exit_grace, &mut receive).await.is_err() {
                debug!("Receive loop still open after {:?}, leaving", exit_grace);
            }
            end
        }
    };

    endpoint.close().await;
    debug!("Client session ended: {:?}", end);
    end
}

/// Forward console lines to the server until exit or end of input
async fn input_loop<I>(mut input: I, endpoint: &Endpoint) -> SessionEnd
where
    I: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match input.read_line(&mut line).await {
            Ok(0) => return SessionEnd::InputClosed,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                return SessionEnd::InputClosed;
            }
        }

        let text = line.trim_end_matches(['\n', '\r']);
        if text.eq_ignore_ascii_case(EXIT_COMMAND) {
            return SessionEnd::UserExit;
        }

        if let Err(e) = endpoint.send_line(text).await {
            error!("Failed to send message: {}", e);
            return SessionEnd::TransportFailed;
        }
    }
}

/// Print server lines until the stream ends
async fn receive_loop<O>(mut reader: LineReader, mut output: O) -> SessionEnd
where
    O: AsyncWrite + Unpin,
{
    loop {
        match reader.receive_line().await {
            Ok(Some(line)) => {
                if let Err(e) = write_console(&mut output, &line).await {
                    warn!("Failed to write to console: {}", e);
                    return SessionEnd::OutputClosed;
                }
            }
            Ok(None) => {
                info!("Server closed the connection");
                return SessionEnd::ServerClosed;
            }
            Err(e) => {
                error!("Error receiving message: {}", e);
                return SessionEnd::TransportFailed;
            }
        }
    }
}

async fn write_console<O>(output: &mut O, line: &str) -> std::io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
