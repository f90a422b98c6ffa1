#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Nexus client integration tests.
//!
//! Provides a scripted [`MockTransport`] and helper functions for
//! constructing server frames.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use nexus_client::protocol::CloseInfo;
use nexus_client::{Connector, NexusConfig, NexusError, Transport};
use serde_json::{json, Value};

// ── MockTransport ───────────────────────────────────────────────────

/// What the mock observed, shared with the test body.
#[derive(Debug, Default)]
pub struct Recorded {
    /// Every frame the session sent, in order.
    pub sent: Vec<String>,
    /// Code and reason passed to `close()`, if it was called.
    pub closed_with: Option<CloseInfo>,
}

impl Recorded {
    /// Sent frames parsed as JSON.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .iter()
            .map(|text| serde_json::from_str(text).expect("sent frame is JSON"))
            .collect()
    }

    /// The `type` field of every sent frame.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default().to_owned())
            .collect()
    }
}

/// A mock transport that replays scripted server frames.
///
/// Scripted items are consumed in order by `recv()`. Once the script runs out
/// `recv()` never resolves, like an idle socket.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, NexusError>>>,
    recorded: Arc<StdMutex<Recorded>>,
    server_close: Option<CloseInfo>,
}

impl MockTransport {
    /// Create a transport with the given scripted incoming items.
    pub fn new(incoming: Vec<Option<Result<String, NexusError>>>) -> (Self, Arc<StdMutex<Recorded>>) {
        let recorded = Arc::new(StdMutex::new(Recorded::default()));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            recorded: Arc::clone(&recorded),
            server_close: None,
        };
        (transport, recorded)
    }

    /// Create a transport that delivers `frames` as text.
    pub fn scripted<I, S>(frames: I) -> (Self, Arc<StdMutex<Recorded>>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(frames.into_iter().map(|f| Some(Ok(f.into()))).collect())
    }

    /// Report `info` as the server's close frame once the script ends with `None`.
    pub fn with_server_close(mut self, info: CloseInfo) -> Self {
        self.server_close = Some(info);
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), NexusError> {
        self.recorded.lock().unwrap().sent.push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, NexusError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), NexusError> {
        self.recorded.lock().unwrap().closed_with = Some(CloseInfo::new(code, reason));
        Ok(())
    }

    fn close_info(&self) -> Option<CloseInfo> {
        self.server_close.clone()
    }
}

// ── Connector helpers ───────────────────────────────────────────────

/// A connector with missed-notification warnings silenced.
pub fn quiet_connector() -> Connector {
    Connector::new(NexusConfig::default().with_suppress_missed_warnings(true))
}

/// Install a test subscriber so `RUST_LOG=debug` shows connector logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Server frame helpers ────────────────────────────────────────────

/// `JOINED` confirming the join to `host`.
pub fn joined_json(host: impl Into<Value>) -> String {
    json!({"type": "JOINED", "host": host.into()}).to_string()
}

/// `NO_SUCH_HOST` with a reason.
pub fn no_such_host_json(reason: &str) -> String {
    json!({"type": "NO_SUCH_HOST", "reason": reason}).to_string()
}

/// `HOSTING` confirming registration.
pub fn hosting_json(id: impl Into<Value>, name: &str) -> String {
    json!({"type": "HOSTING", "id": id.into(), "name": name}).to_string()
}

/// `NEW_CLIENT` announcing a client and its join request.
pub fn new_client_json(client_id: impl Into<Value>, request: Value) -> String {
    json!({"type": "NEW_CLIENT", "clientID": client_id.into(), "request": request}).to_string()
}

/// `LOST_CLIENT` announcing a client left.
pub fn lost_client_json(client_id: impl Into<Value>) -> String {
    json!({"type": "LOST_CLIENT", "clientID": client_id.into()}).to_string()
}

/// `FROM_CLIENT` relaying a client message to the host.
pub fn from_client_json(client_id: impl Into<Value>, message: Value) -> String {
    json!({"type": "FROM_CLIENT", "clientID": client_id.into(), "message": message}).to_string()
}

/// `MESSAGE` relaying a host message to a client.
pub fn message_json(message: Value) -> String {
    json!({"type": "MESSAGE", "message": message}).to_string()
}

/// `LIST` reply carrying `payload`.
pub fn list_json(payload: Value) -> String {
    json!({"type": "LIST", "payload": payload}).to_string()
}

/// `SERVER_INFO` advertising an API version.
pub fn server_info_json(api_version: &str) -> String {
    json!({"type": "SERVER_INFO", "apiVersion": api_version}).to_string()
}
