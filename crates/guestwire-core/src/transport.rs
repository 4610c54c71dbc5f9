//! Transports carrying JSON-RPC requests to a guest agent.
//!
//! A transport owns one connection and performs strictly one request at a
//! time. Sessions serialize access to it, so there is never more than one
//! request in flight per connection.

use crate::config::SessionConfig;
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use guestwire_protocol::{Request, Response};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout_at;

/// One request/response exchange with an agent.
///
/// Implementations return the `result` member on success and convert an
/// error member with [`CoreError::from_rpc`].
#[async_trait]
pub trait Transport: Send {
    /// Send `method` with `params` and wait for the matching response.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value>;
}

/// Newline-delimited JSON-RPC over a Unix socket.
///
/// Works against a plain agent socket and against a Firecracker-style
/// vsock socket, where a `CONNECT <port>` handshake selects the guest port.
pub struct UnixTransport {
    reader: BufReader<ReadHalf<UnixStream>>,
    writer: BufWriter<WriteHalf<UnixStream>>,
    /// Bytes of a response line not yet terminated. Survives a timed-out
    /// call so the next read resumes mid-line.
    pending: Vec<u8>,
    next_id: u64,
    call_timeout: Duration,
}

impl UnixTransport {
    /// Connect to the agent, retrying until `connect_timeout` elapses.
    ///
    /// The agent may still be booting when the host first tries, so failed
    /// attempts are retried every `retry_interval`.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let path = config.socket_path.as_path();
        let start = Instant::now();
        tracing::debug!(path = %path.display(), "Connecting to agent");

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match Self::try_connect(path, config.vsock_port).await {
                Ok((reader, writer)) => {
                    tracing::info!(
                        path = %path.display(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        attempts,
                        "Connected to agent"
                    );
                    return Ok(Self {
                        reader,
                        writer,
                        pending: Vec::new(),
                        next_id: 1,
                        call_timeout: config.call_timeout,
                    });
                }
                Err(e) => {
                    if start.elapsed() >= config.connect_timeout {
                        tracing::warn!(
                            path = %path.display(),
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            attempts,
                            error = %e,
                            "Agent connection timeout"
                        );
                        return Err(CoreError::Timeout(config.connect_timeout));
                    }
                    tracing::trace!(error = %e, attempt = attempts, "Connection attempt failed, retrying...");
                    tokio::time::sleep(config.retry_interval).await;
                }
            }
        }
    }

    async fn try_connect(
        path: &Path,
        vsock_port: Option<u32>,
    ) -> Result<(BufReader<ReadHalf<UnixStream>>, BufWriter<WriteHalf<UnixStream>>)> {
        tracing::trace!(path = %path.display(), "Attempting socket connection");
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| CoreError::Connection(format!("socket connect failed: {e}")))?;

        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        let mut writer = BufWriter::new(write_half);

        if let Some(port) = vsock_port {
            tracing::trace!(port, "Sending CONNECT handshake");
            writer
                .write_all(format!("CONNECT {port}\n").as_bytes())
                .await
                .map_err(|e| CoreError::Connection(format!("handshake write failed: {e}")))?;
            writer.flush().await?;

            let mut response = String::new();
            reader.read_line(&mut response).await?;
            if !response.starts_with("OK ") {
                tracing::debug!(response = %response.trim(), "Handshake failed");
                return Err(CoreError::Connection(format!(
                    "handshake failed: {}",
                    response.trim()
                )));
            }
            tracing::debug!(response = %response.trim(), "vsock handshake successful");
        }

        Ok((reader, writer))
    }

    /// Read the response to request `id`.
    ///
    /// Responses to earlier requests that timed out arrive late on the same
    /// connection; they are discarded. The call timeout covers the whole
    /// wait, including discarded responses.
    async fn read_response(&mut self, id: u64, method: &str) -> Result<Response> {
        let deadline = tokio::time::Instant::now() + self.call_timeout;
        loop {
            match timeout_at(deadline, self.reader.read_until(b'\n', &mut self.pending)).await {
                Ok(Ok(0)) => {
                    tracing::warn!(method = %method, id, "Agent closed the connection");
                    return Err(CoreError::Connection("agent closed the connection".into()));
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(method = %method, id, error = %e, "RPC read error");
                    return Err(e.into());
                }
                Err(_) => {
                    tracing::warn!(
                        method = %method,
                        id,
                        timeout_ms = self.call_timeout.as_millis() as u64,
                        "RPC response timeout"
                    );
                    return Err(CoreError::Timeout(self.call_timeout));
                }
            }

            if self.pending.last() != Some(&b'\n') {
                self.pending.clear();
                return Err(CoreError::Connection(
                    "agent closed the connection mid-response".into(),
                ));
            }
            let line = std::mem::take(&mut self.pending);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            tracing::trace!(response = %String::from_utf8_lossy(&line).trim(), "RPC response body");

            let response: Response = serde_json::from_slice(&line)?;
            // Id 0 answers a request the agent could not parse.
            if response.id != 0 && response.id < id {
                tracing::debug!(stale_id = response.id, id, "Discarding late response");
                continue;
            }
            return Ok(response);
        }
    }
}

#[async_trait]
impl Transport for UnixTransport {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request_str = serde_json::to_string(&Request::new(id, method, params))?;
        tracing::debug!(method = %method, id, "Sending RPC request");
        tracing::trace!(request = %request_str, "RPC request body");

        self.writer.write_all(request_str.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let response = self.read_response(id, method).await?;
        into_result(id, method, response)
    }
}

/// Check that `response` answers request `id` and unwrap its result.
pub fn into_result(id: u64, method: &str, response: Response) -> Result<Value> {
    if response.id != id {
        return Err(CoreError::Protocol(format!(
            "response id {} does not match request id {id}",
            response.id
        )));
    }
    if let Some(error) = response.error {
        tracing::debug!(method = %method, id, code = error.code, message = %error.message, "RPC error response");
        return Err(CoreError::from_rpc(error));
    }
    tracing::debug!(method = %method, id, "RPC call successful");
    // A `null` result deserializes as an absent one.
    Ok(response.result.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use guestwire_protocol::error_codes;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::net::UnixListener;

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn socket_path(tag: &str) -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("guestwire-{tag}-{}-{n}.sock", std::process::id()))
    }

    fn config(path: &Path) -> SessionConfig {
        SessionConfig::builder()
            .socket(path)
            .connect_timeout(Duration::from_millis(500))
            .retry_interval(Duration::from_millis(20))
            .call_timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    #[test]
    fn test_into_result_success_and_mismatch() {
        let ok = into_result(3, "ping", Response::success(3, json!({"pong": true}))).unwrap();
        assert_eq!(ok["pong"], true);

        let err = into_result(4, "ping", Response::success(3, json!(null))).unwrap_err();
        assert!(matches!(err, CoreError::Protocol(_)));

        let wire = serde_json::to_string(&Response::success(5, Value::Null)).unwrap();
        let decoded: Response = serde_json::from_str(&wire).unwrap();
        assert_eq!(into_result(5, "execute", decoded).unwrap(), Value::Null);
    }

    #[test]
    fn test_into_result_maps_error() {
        let response = Response::error(9, error_codes::METHOD_NOT_FOUND, "method not found: x");
        let err = into_result(9, "x", response).unwrap_err();
        assert!(matches!(err, CoreError::Rpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_connect_times_out_without_listener() {
        let path = socket_path("missing");
        let result = UnixTransport::connect(&config(&path)).await;
        assert!(matches!(result, Err(CoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_handshake_and_request() {
        let path = socket_path("handshake");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            assert_eq!(lines.next_line().await.unwrap().unwrap(), "CONNECT 52");
            write_half.write_all(b"OK 1073741824\n").await.unwrap();

            let line = lines.next_line().await.unwrap().unwrap();
            let request: Request = serde_json::from_str(&line).unwrap();
            assert_eq!(request.method, "ping");
            let reply = serde_json::to_string(&Response::success(request.id, json!({"pong": true})))
                .unwrap();
            write_half.write_all(format!("{reply}\n").as_bytes()).await.unwrap();

            // Swallow the next request without answering.
            let _ = lines.next_line().await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut cfg = config(&path);
        cfg.vsock_port = Some(52);
        let mut transport = UnixTransport::connect(&cfg).await.unwrap();
        let result = transport.request("ping", json!({})).await.unwrap();
        assert_eq!(result["pong"], true);

        let err = transport.request("ping", json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));

        server.abort();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_late_response_is_skipped_after_timeout() {
        let path = socket_path("late");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            // First reply arrives in two pieces, after the caller gave up.
            let first: Request =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let reply = serde_json::to_string(&Response::success(first.id, json!("late"))).unwrap();
            let (head, tail) = reply.split_at(reply.len() / 2);
            write_half.write_all(head.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            write_half.write_all(format!("{tail}\n").as_bytes()).await.unwrap();

            while let Ok(Some(line)) = lines.next_line().await {
                let request: Request = serde_json::from_str(&line).unwrap();
                let reply = serde_json::to_string(&Response::success(
                    request.id,
                    json!({"answer": request.id}),
                ))
                .unwrap();
                write_half.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
            }
        });

        let mut transport = UnixTransport::connect(&config(&path)).await.unwrap();
        let err = transport.request("evaluate", json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));

        for expected in 2..5 {
            let result = transport.request("evaluate", json!({})).await.unwrap();
            assert_eq!(result["answer"], expected);
        }

        server.abort();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_connection_error() {
        let path = socket_path("rejected");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let _ = lines.next_line().await;
            write_half.write_all(b"FAILURE\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let result = UnixTransport::try_connect(&path, Some(52)).await;
        assert!(matches!(result, Err(CoreError::Connection(_))));
        let _ = std::fs::remove_file(path);
    }
}
