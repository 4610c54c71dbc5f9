//! Unix socket server.
//!
//! Reads newline-delimited JSON-RPC requests and writes one response line
//! per request. Every connection is its own [`GuestSession`].

use crate::config::{AgentConfig, Limits};
use crate::handler::handle_request;
use crate::session::GuestSession;
use guestwire_protocol::{error_codes, Request, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

/// Bind the agent's listening socket, replacing a stale socket file.
pub fn bind(socket_path: &Path) -> std::io::Result<UnixListener> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
        debug!("removed existing socket file");
    }
    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "listening for connections");
    Ok(listener)
}

/// Accept connections forever, one task per connection.
pub async fn serve(listener: UnixListener, config: AgentConfig) {
    let limits = config.limits;
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                debug!("accepted new connection");
                tokio::spawn(async move {
                    let (reader, writer) = stream.into_split();
                    if let Err(e) = handle_connection(reader, writer, limits).await {
                        warn!(error = %e, "connection error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}

/// Serve one connection until the peer hangs up.
///
/// The session, and with it every object handed out on this connection,
/// is dropped when this returns.
pub async fn handle_connection<R, W>(
    reader: R,
    mut writer: W,
    limits: Limits,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let session = GuestSession::new(limits);
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            debug!(session = %session.id(), "client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!(request = %trimmed, "received request");

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(req) => handle_request(&session, req),
            Err(e) => {
                warn!(error = %e, "failed to parse request");
                Response::error(0, error_codes::PARSE_ERROR, format!("parse error: {}", e))
            }
        };

        let json = serde_json::to_string(&response)?;
        debug!(response = %json, "sending response");
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guestwire_protocol::methods;
    use serde_json::json;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_round_trip_over_duplex() {
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(async move {
            handle_connection(server_read, server_write, Limits::default())
                .await
                .unwrap();
        });

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();

        let req = Request::new(7, methods::EVALUATE, json!({"expression": "6 * 7"}));
        let mut payload = serde_json::to_string(&req).unwrap();
        payload.push('\n');
        client_write.write_all(payload.as_bytes()).await.unwrap();
        client_write.write_all(b"not json\n").await.unwrap();

        let first: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.id, 7);
        assert_eq!(first.result.unwrap()["value"], 42);

        let second: Response =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second.error.unwrap().code, error_codes::PARSE_ERROR);

        drop(client_write);
        drop(lines);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let path = std::env::temp_dir().join(format!("guestwire-bind-{}.sock", std::process::id()));
        std::fs::write(&path, b"stale").unwrap();
        let listener = bind(&path).unwrap();
        drop(listener);
        let _ = std::fs::remove_file(path);
    }
}
