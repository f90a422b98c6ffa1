//! # Loopback Lobby Example
//!
//! Runs a tiny in-process relay and two connectors against it:
//!
//! 1. The first connector calls `join_or_host("lobby")`, finds no host and
//!    becomes the host.
//! 2. The second connector calls `join_or_host("lobby")` and joins it.
//! 3. The client greets the host, the host broadcasts a reply.
//! 4. The client leaves and the host sees it go.
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=nexus_client=debug cargo run --example loopback_lobby
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nexus_client::protocol::CloseInfo;
use nexus_client::{Connector, NexusConfig, NexusError, RoleKind, Session, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Loopback transport
// ─────────────────────────────────────────────────────────────────────

/// What a connection tells the relay.
enum RelayEvent {
    Connect(usize, mpsc::UnboundedSender<String>),
    Frame(usize, String),
    Disconnect(usize),
}

/// The client half of an in-process connection to the relay.
struct LoopbackTransport {
    id: usize,
    relay: mpsc::UnboundedSender<RelayEvent>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl LoopbackTransport {
    fn connect(id: usize, relay: &mpsc::UnboundedSender<RelayEvent>) -> Result<Self, NexusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        relay
            .send(RelayEvent::Connect(id, tx))
            .map_err(|e| NexusError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            id,
            relay: relay.clone(),
            rx,
        })
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), NexusError> {
        self.relay
            .send(RelayEvent::Frame(self.id, message))
            .map_err(|e| NexusError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, NexusError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self, _code: u16, _reason: String) -> Result<(), NexusError> {
        self.rx.close();
        self.relay
            .send(RelayEvent::Disconnect(self.id))
            .map_err(|_| NexusError::TransportClosed)
    }

    fn close_info(&self) -> Option<CloseInfo> {
        Some(CloseInfo::new(CloseInfo::NORMAL, "relay shut down"))
    }
}

// ─────────────────────────────────────────────────────────────────────
// In-process relay
// ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Relay {
    links: HashMap<usize, mpsc::UnboundedSender<String>>,
    hosts: HashMap<String, usize>,
    host_of: HashMap<usize, usize>,
}

impl Relay {
    fn push(&self, to: usize, frame: Value) {
        if let Some(link) = self.links.get(&to) {
            let _ = link.send(frame.to_string());
        }
    }

    fn clients_of(&self, host: usize) -> Vec<usize> {
        self.host_of
            .iter()
            .filter(|(_, h)| **h == host)
            .map(|(client, _)| *client)
            .collect()
    }

    fn handle(&mut self, from: usize, frame: Value) {
        let name = frame
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let kind = frame
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        match kind.as_str() {
            "HOST" => {
                self.hosts.insert(name.clone(), from);
                self.push(from, json!({"type": "HOSTING", "id": from, "name": name}));
            }
            "JOIN" => match self.hosts.get(&name).copied() {
                Some(host) => {
                    self.host_of.insert(from, host);
                    self.push(from, json!({"type": "JOINED", "host": host}));
                    self.push(
                        host,
                        json!({"type": "NEW_CLIENT", "clientID": from, "request": frame}),
                    );
                }
                None => self.push(
                    from,
                    json!({"type": "NO_SUCH_HOST", "reason": format!("no host named {name}")}),
                ),
            },
            "SEND" => {
                let message = frame.get("message").cloned().unwrap_or(Value::Null);
                if let Some(host) = self.host_of.get(&from).copied() {
                    self.push(
                        host,
                        json!({"type": "FROM_CLIENT", "clientID": from, "message": message}),
                    );
                    return;
                }
                let targets = match frame.get("clientIDs").and_then(Value::as_array) {
                    Some(ids) => ids
                        .iter()
                        .filter_map(Value::as_u64)
                        .map(|id| id as usize)
                        .collect(),
                    None => self.clients_of(from),
                };
                for client in targets {
                    self.push(client, json!({"type": "MESSAGE", "message": message}));
                }
            }
            "LIST" => {
                let names: Vec<&String> = self.hosts.keys().collect();
                self.push(from, json!({"type": "LIST", "payload": names}));
            }
            other => tracing::warn!(kind = other, "relay ignored frame"),
        }
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<RelayEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                RelayEvent::Connect(id, link) => {
                    self.links.insert(id, link);
                    self.push(id, json!({"type": "SERVER_INFO", "apiVersion": "1.0.0"}));
                }
                RelayEvent::Frame(from, text) => match serde_json::from_str(&text) {
                    Ok(frame) => self.handle(from, frame),
                    Err(e) => tracing::warn!("relay got malformed frame: {e}"),
                },
                RelayEvent::Disconnect(id) => {
                    self.links.remove(&id);
                    if let Some(host) = self.host_of.remove(&id) {
                        self.push(host, json!({"type": "LOST_CLIENT", "clientID": id}));
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Two connectors meeting in a lobby
// ─────────────────────────────────────────────────────────────────────

async fn open(
    id: usize,
    relay: &mpsc::UnboundedSender<RelayEvent>,
) -> Result<Session<LoopbackTransport>, NexusError> {
    let mut connector = Connector::new(NexusConfig::new(format!("loopback://{id}")));
    connector.join_or_host("lobby")?;
    let mut session = Session::new(connector);
    session.attach(LoopbackTransport::connect(id, relay)?).await?;
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (relay_tx, relay_rx) = mpsc::unbounded_channel();
    tokio::spawn(Relay::default().run(relay_rx));

    // ── Host ────────────────────────────────────────────────────────
    let mut host = open(1, &relay_tx).await?;
    host.run_until(|c| c.hosting().is_succeeded()).await?;
    tracing::info!(role = %host.connector().role(), "first connector is hosting");

    let inbox = Arc::new(Mutex::new(Vec::new()));
    if let Some(mut state) = host.connector_mut().as_host_mut() {
        state
            .on_new_client()
            .subscribe(|(id, request)| tracing::info!(%id, %request, "client arrived"));
        state
            .on_lost_client()
            .subscribe(|id| tracing::info!(%id, "client left"));
        let inbox = Arc::clone(&inbox);
        state.on_message().subscribe(move |(message, from)| {
            if let Ok(mut inbox) = inbox.lock() {
                inbox.push((from.clone(), message.clone()));
            }
        });
    }

    // ── Client ──────────────────────────────────────────────────────
    let mut guest = open(2, &relay_tx).await?;
    let replies = Arc::new(Mutex::new(Vec::new()));
    guest
        .connector_mut()
        .joined()
        .then(|host_id| tracing::info!(%host_id, "second connector joined"));
    guest
        .run_until(|c| c.role() == RoleKind::Client && c.joined().is_succeeded())
        .await?;
    if let Some(mut client) = guest.connector_mut().as_client_mut() {
        let replies = Arc::clone(&replies);
        client.on_message().subscribe(move |message| {
            if let Ok(mut replies) = replies.lock() {
                replies.push(message.clone());
            }
        });
        client.send(json!({"hello": "host"}));
    }
    guest.flush().await?;

    // ── Host answers ────────────────────────────────────────────────
    let seen = Arc::clone(&inbox);
    host.run_until(move |_| seen.lock().map(|m| !m.is_empty()).unwrap_or(true))
        .await?;
    if let Ok(messages) = inbox.lock() {
        for (from, message) in messages.iter() {
            tracing::info!(%from, %message, "host received");
        }
    }
    if let Some(mut state) = host.connector_mut().as_host_mut() {
        state.broadcast(json!({"welcome": "to the lobby"}));
    }
    host.flush().await?;

    let seen = Arc::clone(&replies);
    guest
        .run_until(move |_| seen.lock().map(|m| !m.is_empty()).unwrap_or(true))
        .await?;
    tracing::info!(replies = ?replies.lock().map(|r| r.clone()).unwrap_or_default(), "guest received");

    // ── Leave ───────────────────────────────────────────────────────
    guest.close("bye", CloseInfo::NORMAL).await?;
    host.run_until(|c| c.as_host().is_some_and(|h| h.client_ids().is_empty()))
        .await?;
    host.close("lobby closed", CloseInfo::NORMAL).await?;

    tracing::info!("done");
    Ok(())
}
