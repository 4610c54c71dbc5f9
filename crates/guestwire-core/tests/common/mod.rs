//! Shared helpers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use guestwire_agent::config::Limits;
use guestwire_agent::handler::handle_request;
use guestwire_agent::GuestSession;
use guestwire_core::{into_result, RemoteSession, Result, Transport};
use guestwire_protocol::Request;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

/// Runs requests straight through the agent's handler, in process.
pub struct LocalTransport {
    session: GuestSession,
    next_id: u64,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            session: GuestSession::new(Limits::default()),
            next_id: 1,
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let response = handle_request(&self.session, Request::new(id, method, params));
        into_result(id, method, response)
    }
}

/// A session backed by a fresh in-process agent.
pub fn local_session() -> RemoteSession {
    RemoteSession::new(LocalTransport::new())
}

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A unique path under the system temp dir.
pub fn temp_path(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("guestwire-{tag}-{}-{n}", std::process::id()))
}

/// Write `content` to a fresh temp file and return its path as a string.
pub fn temp_file(tag: &str, content: &str) -> String {
    let path = temp_path(tag);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}
