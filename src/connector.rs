//! Sans-IO role state machine for the Nexus relay protocol.
//!
//! [`Connector`] never touches a socket. The driver feeds it transport signals
//! ([`handle_open`](Connector::handle_open), [`handle_message`](Connector::handle_message),
//! [`handle_error`](Connector::handle_error), [`handle_close`](Connector::handle_close))
//! and collects outbound work with [`drain_outbound`](Connector::drain_outbound).
//! Outbound work issued before the transport opens is held and released in
//! call order once it does.
//!
//! Roles are committed optimistically: [`host`](Connector::host) switches to the
//! `Host` role immediately and only reverts if the server or the transport says
//! otherwise.
//!
//! # Example
//!
//! ```
//! use nexus_client::{Connector, NexusConfig, RoleKind};
//!
//! let mut connector = Connector::new(NexusConfig::default());
//! connector.join("roomA")?;
//! assert_eq!(connector.role(), RoleKind::Client);
//! assert!(connector.drain_outbound().is_empty()); // not open yet
//!
//! connector.handle_open();
//! assert_eq!(connector.drain_outbound().len(), 1);
//!
//! connector.handle_message(r#"{"type":"JOINED","host":"abc"}"#);
//! assert!(connector.joined().is_succeeded());
//! # Ok::<(), nexus_client::NexusError>(())
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::NexusConfig;
use crate::error::{NexusError, Result};
use crate::outcome::DeferredOutcome;
use crate::protocol::{
    ClientFrame, ClientId, CloseInfo, HostDescriptor, HostId, HostingInfo, ServerFrame,
    ServerInfo,
};
use crate::role::{ClientState, HostState, Role, RoleKind};
use crate::signal::DeferredSignal;
use crate::version::check_api_version;

/// Default reason used by [`Connector::close_default`].
pub const DEFAULT_CLOSE_REASON: &str = "You closed your connection";

// ── Outbound queue ──────────────────────────────────────────────────

/// Work the driver must perform on the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Encode and send a frame.
    Frame(ClientFrame),
    /// Close the transport.
    Close(CloseInfo),
}

/// State of the underlying transport as seen by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not opened yet; outbound work is held.
    Connecting,
    /// Open; outbound work is released.
    Open,
    /// Failed with a transport error.
    Failed,
    /// Closed.
    Closed,
}

#[derive(Debug)]
struct Outbox {
    link: LinkState,
    queue: VecDeque<Outbound>,
}

impl Outbox {
    fn push(&mut self, item: Outbound) {
        match self.link {
            LinkState::Connecting | LinkState::Open => self.queue.push_back(item),
            LinkState::Failed | LinkState::Closed => {
                debug!(?item, "dropping outbound work after the connection ended");
            }
        }
    }

    fn is_live(&self) -> bool {
        matches!(self.link, LinkState::Connecting | LinkState::Open)
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Client-side connector that morphs between the `User`, `Host`, `Client`
/// and `Dead` roles.
pub struct Connector {
    config: NexusConfig,
    role: Role,
    outbox: Outbox,
    connected: DeferredOutcome<(), NexusError>,
    hosting: DeferredOutcome<HostingInfo, NexusError>,
    joined: DeferredOutcome<HostId, NexusError>,
    on_list: DeferredSignal<Value>,
    on_server_info: DeferredSignal<ServerInfo>,
    on_close: DeferredSignal<CloseInfo>,
}

impl Connector {
    /// Create a connector in the `User` role, waiting for the transport to open.
    pub fn new(config: NexusConfig) -> Self {
        let quiet = config.suppress_missed_warnings;
        let mut connected = DeferredOutcome::warning("connected", quiet);
        // Opening releases the outbox and an error fails pending requests,
        // so both resolutions always have an observer.
        connected.then(|_| {}).on_error(|_| {});
        Self {
            role: RoleKind::User.instantiate(quiet),
            outbox: Outbox {
                link: LinkState::Connecting,
                queue: VecDeque::new(),
            },
            connected,
            hosting: DeferredOutcome::warning("hosting", quiet),
            joined: DeferredOutcome::warning("joined", quiet),
            on_list: DeferredSignal::warning("on_list", quiet),
            // The version check always observes SERVER_INFO.
            on_server_info: DeferredSignal::silent("on_server_info"),
            on_close: DeferredSignal::warning("on_close", quiet),
            config,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Configuration this connector was built with.
    pub fn config(&self) -> &NexusConfig {
        &self.config
    }

    /// Client API version.
    pub fn api_version(&self) -> &str {
        &self.config.api_version
    }

    /// Active role.
    pub fn role(&self) -> RoleKind {
        self.role.kind()
    }

    /// Transport state.
    pub fn link_state(&self) -> LinkState {
        self.outbox.link
    }

    /// Resolves when the transport opens; fails when it errors.
    pub fn connected(&mut self) -> &mut DeferredOutcome<(), NexusError> {
        &mut self.connected
    }

    /// Resolves when the server confirms a host registration.
    pub fn hosting(&mut self) -> &mut DeferredOutcome<HostingInfo, NexusError> {
        &mut self.hosting
    }

    /// Resolves with the host id when the server confirms a join.
    pub fn joined(&mut self) -> &mut DeferredOutcome<HostId, NexusError> {
        &mut self.joined
    }

    /// Fires with the payload of every `LIST` reply.
    pub fn on_list(&mut self) -> &mut DeferredSignal<Value> {
        &mut self.on_list
    }

    /// Fires with every `SERVER_INFO` frame.
    pub fn on_server_info(&mut self) -> &mut DeferredSignal<ServerInfo> {
        &mut self.on_server_info
    }

    /// Fires when the transport closes.
    pub fn on_close(&mut self) -> &mut DeferredSignal<CloseInfo> {
        &mut self.on_close
    }

    /// Host state, if the connector is a host.
    pub fn as_host(&self) -> Option<&HostState> {
        match &self.role {
            Role::Host(host) => Some(host),
            _ => None,
        }
    }

    /// Host capabilities, if the connector is a host.
    pub fn as_host_mut(&mut self) -> Option<HostHandle<'_>> {
        match &mut self.role {
            Role::Host(state) => Some(HostHandle {
                state,
                outbox: &mut self.outbox,
            }),
            _ => None,
        }
    }

    /// Client state, if the connector is a client.
    pub fn as_client(&self) -> Option<&ClientState> {
        match &self.role {
            Role::Client(client) => Some(client),
            _ => None,
        }
    }

    /// Client capabilities, if the connector is a client.
    pub fn as_client_mut(&mut self) -> Option<ClientHandle<'_>> {
        match &mut self.role {
            Role::Client(state) => Some(ClientHandle {
                state,
                outbox: &mut self.outbox,
            }),
            _ => None,
        }
    }

    // ── Role transitions ────────────────────────────────────────────

    /// Replace the active role with a fresh instance of `to`.
    ///
    /// Every attribute of the previous role is dropped before the new one is
    /// installed.
    pub fn change_role(&mut self, to: RoleKind) {
        let from = self.role.kind();
        self.role = to.instantiate(self.config.suppress_missed_warnings);
        debug!(%from, %to, "role changed");
    }

    /// Like [`change_role`](Self::change_role), looking the role up by name.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::InvalidRole`] if `name` is not a registered role.
    pub fn change_role_named(&mut self, name: &str) -> Result<()> {
        let to = name.parse::<RoleKind>()?;
        self.change_role(to);
        Ok(())
    }

    /// Leave `expected` for `to`.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::RoleMismatch`] without changing anything if
    /// `expected` is not the active role.
    pub fn transition(&mut self, expected: RoleKind, to: RoleKind) -> Result<()> {
        let actual = self.role.kind();
        if actual != expected {
            return Err(NexusError::RoleMismatch { expected, actual });
        }
        self.change_role(to);
        Ok(())
    }

    // ── User operations ─────────────────────────────────────────────

    /// Register as a host. The role becomes `Host` immediately; the `HOST`
    /// request is sent once the transport is open.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::WrongRole`] unless the connector is in the `User` role.
    pub fn host(
        &mut self,
        descriptor: impl Into<HostDescriptor>,
    ) -> Result<&mut DeferredOutcome<HostingInfo, NexusError>> {
        self.require_user("host")?;
        let fields = descriptor.into().into_fields();
        self.outbox.push(Outbound::Frame(ClientFrame::Host(fields)));
        self.transition(RoleKind::User, RoleKind::Host)?;
        self.hosting.reset();
        Ok(&mut self.hosting)
    }

    /// Join an existing host. The role becomes `Client` immediately; the `JOIN`
    /// request is sent once the transport is open.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::WrongRole`] unless the connector is in the `User` role.
    pub fn join(
        &mut self,
        descriptor: impl Into<HostDescriptor>,
    ) -> Result<&mut DeferredOutcome<HostId, NexusError>> {
        self.require_user("join")?;
        let fields = descriptor.into().into_fields();
        self.outbox.push(Outbound::Frame(ClientFrame::Join(fields)));
        self.transition(RoleKind::User, RoleKind::Client)?;
        self.joined.reset();
        Ok(&mut self.joined)
    }

    /// Join the host matching `descriptor`, or become that host if the server
    /// reports there is none.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::WrongRole`] unless the connector is in the `User` role.
    pub fn join_or_host(
        &mut self,
        descriptor: impl Into<HostDescriptor>,
    ) -> Result<&mut DeferredOutcome<HostId, NexusError>> {
        let descriptor = descriptor.into();
        self.join(descriptor.clone())?;
        if let Role::Client(client) = &mut self.role {
            client.fallback = Some(descriptor);
        }
        Ok(&mut self.joined)
    }

    // ── Connection-lifetime operations ──────────────────────────────

    /// Request the host listing. The reply fires [`on_list`](Self::on_list).
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::NotConnected`] if the transport already ended.
    pub fn get_hosts(&mut self) -> Result<&mut DeferredSignal<Value>> {
        self.require_live()?;
        self.outbox.push(Outbound::Frame(ClientFrame::List));
        Ok(&mut self.on_list)
    }

    /// Close the transport with the given reason and code.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::NotConnected`] if the transport already ended.
    pub fn close(
        &mut self,
        reason: impl Into<String>,
        code: u16,
    ) -> Result<&mut DeferredSignal<CloseInfo>> {
        self.require_live()?;
        // A locally requested close is expected; don't warn about it.
        if !self.on_close.has_subscribers() {
            self.on_close.subscribe(|_| {});
        }
        self.outbox.push(Outbound::Close(CloseInfo::new(code, reason)));
        Ok(&mut self.on_close)
    }

    /// Close the transport with a normal closure code.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::NotConnected`] if the transport already ended.
    pub fn close_default(&mut self) -> Result<&mut DeferredSignal<CloseInfo>> {
        self.close(DEFAULT_CLOSE_REASON, CloseInfo::NORMAL)
    }

    /// Take the outbound work released so far. Empty until the transport opens.
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        if self.outbox.link != LinkState::Open {
            return Vec::new();
        }
        self.outbox.queue.drain(..).collect()
    }

    /// Returns `true` if outbound work is ready to be drained.
    pub fn has_outbound(&self) -> bool {
        self.outbox.link == LinkState::Open && !self.outbox.queue.is_empty()
    }

    // ── Transport signals ───────────────────────────────────────────

    /// The transport opened. Releases held outbound work and resolves `connected`.
    pub fn handle_open(&mut self) {
        if self.outbox.link != LinkState::Connecting {
            warn!(link = ?self.outbox.link, "ignoring open signal");
            return;
        }
        self.outbox.link = LinkState::Open;
        info!(
            server = %self.config.server_address,
            queued = self.outbox.queue.len(),
            "connected to relay server"
        );
        self.connected.resolve_success(());
    }

    /// A raw text frame arrived.
    pub fn handle_message(&mut self, text: &str) {
        if self.config.debug {
            debug!(frame = text, "server message");
        }
        match ServerFrame::from_text(text) {
            Ok(ServerFrame::Unknown) => info!(frame = text, "unhandled server message"),
            Ok(frame) => self.handle_frame(frame),
            Err(e) => warn!(frame = text, "failed to decode server message: {e}"),
        }
    }

    /// Dispatch a decoded frame: the active role's handler first, then the
    /// connection-lifetime handler for anything the role does not recognize.
    pub fn handle_frame(&mut self, frame: ServerFrame) {
        let unhandled = match self.role.kind() {
            RoleKind::Host => self.dispatch_host(frame),
            RoleKind::Client => self.dispatch_client(frame),
            RoleKind::User | RoleKind::Dead => Some(frame),
        };
        if let Some(frame) = unhandled {
            self.dispatch_base(frame);
        }
    }

    /// The transport failed. Fails `connected` and any pending host/join
    /// request, drops held work, and collapses into the `Dead` role.
    pub fn handle_error(&mut self, err: NexusError) {
        if !self.outbox.is_live() {
            debug!("ignoring transport error after the connection ended: {err}");
            return;
        }
        error!("server connection failed: {err}");
        let message = err.to_string();
        self.outbox.link = LinkState::Failed;
        self.outbox.queue.clear();

        let previous = self.role.kind();
        self.change_role(RoleKind::Dead);
        self.connected.resolve_failure(err);
        self.fail_pending_request(previous, || NexusError::ConnectionFailed(message.clone()));
    }

    /// The transport closed. Fires [`on_close`](Self::on_close) and collapses
    /// into the `Dead` role.
    pub fn handle_close(&mut self, info: CloseInfo) {
        if self.outbox.link == LinkState::Closed {
            debug!(code = info.code, "ignoring repeated close signal");
            return;
        }
        let was_connecting = self.outbox.link == LinkState::Connecting;
        info!(code = info.code, reason = %info.reason, "connection closed");
        self.outbox.link = LinkState::Closed;
        self.outbox.queue.clear();

        let previous = self.role.kind();
        self.change_role(RoleKind::Dead);
        let closed = || NexusError::ConnectionClosed {
            code: info.code,
            reason: info.reason.clone(),
        };
        if was_connecting {
            self.connected.resolve_failure(closed());
        }
        self.fail_pending_request(previous, closed);
        self.on_close.trigger(&info);
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn require_user(&self, operation: &'static str) -> Result<()> {
        match self.role.kind() {
            RoleKind::User => Ok(()),
            role => Err(NexusError::WrongRole { operation, role }),
        }
    }

    fn require_live(&self) -> Result<()> {
        if self.outbox.is_live() {
            Ok(())
        } else {
            Err(NexusError::NotConnected)
        }
    }

    /// Fail the host/join outcome still waiting on the server, if any.
    fn fail_pending_request(&mut self, role: RoleKind, err: impl Fn() -> NexusError) {
        match role {
            RoleKind::Host if self.hosting.is_pending() => self.hosting.resolve_failure(err()),
            RoleKind::Client if self.joined.is_pending() => self.joined.resolve_failure(err()),
            _ => {}
        }
    }

    fn dispatch_host(&mut self, frame: ServerFrame) -> Option<ServerFrame> {
        let Role::Host(host) = &mut self.role else {
            return Some(frame);
        };
        match frame {
            ServerFrame::Hosting(info) => {
                host.host_id = info.id.clone();
                host.host_name = info.name.clone();
                info!(id = ?info.id, name = ?info.name, "hosting confirmed");
                self.hosting.resolve_success(info);
            }
            ServerFrame::NewClient { client_id, request } => {
                if host.add_client(&client_id) {
                    debug!(%client_id, "client joined");
                    host.on_new_client.trigger(&(client_id, request));
                } else {
                    warn!(%client_id, "duplicate NEW_CLIENT ignored");
                }
            }
            ServerFrame::LostClient { client_id } => {
                if host.remove_client(&client_id) {
                    debug!(%client_id, "client left");
                    host.on_lost_client.trigger(&client_id);
                } else {
                    warn!(%client_id, "LOST_CLIENT for unknown client ignored");
                }
            }
            ServerFrame::FromClient { message, client_id } => {
                host.on_message.trigger(&(message, client_id));
            }
            other => return Some(other),
        }
        None
    }

    fn dispatch_client(&mut self, frame: ServerFrame) -> Option<ServerFrame> {
        let Role::Client(client) = &mut self.role else {
            return Some(frame);
        };
        match frame {
            ServerFrame::Joined { host } => {
                client.host_id = Some(host.clone());
                client.fallback = None;
                let held = std::mem::take(&mut client.held);
                info!(%host, held = held.len(), "joined host");
                for message in held {
                    self.outbox.push(Outbound::Frame(ClientFrame::Send {
                        message,
                        client_ids: None,
                    }));
                }
                self.joined.resolve_success(host);
            }
            ServerFrame::NoSuchHost { reason } => {
                let fallback = client.fallback.take();
                if !client.held.is_empty() {
                    debug!(dropped = client.held.len(), "discarding messages held for a rejected join");
                }
                info!(?reason, "no such host");
                if let Err(e) = self.transition(RoleKind::Client, RoleKind::User) {
                    error!("failed to revert rejected join: {e}");
                    return None;
                }
                let err = NexusError::NoSuchHost { reason };
                if fallback.is_some() {
                    self.joined.resolve_failure_handled(err);
                } else {
                    self.joined.resolve_failure(err);
                }
                if let Some(descriptor) = fallback {
                    debug!("join rejected, hosting instead");
                    if let Err(e) = self.host(descriptor) {
                        warn!("join_or_host fallback failed: {e}");
                    }
                }
            }
            ServerFrame::Message { message } => {
                client.on_message.trigger(&message);
            }
            other => return Some(other),
        }
        None
    }

    fn dispatch_base(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::List { payload } => self.on_list.trigger(&payload),
            ServerFrame::ServerInfo(info) => {
                match info.api_version.as_deref() {
                    Some(server) => {
                        check_api_version(&self.config.api_version, server);
                    }
                    None => warn!("SERVER_INFO without apiVersion"),
                }
                self.on_server_info.trigger(&info);
            }
            other => info!(
                kind = other.kind(),
                role = %self.role.kind(),
                "unhandled server message"
            ),
        }
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("role", &self.role.kind())
            .field("link", &self.outbox.link)
            .field("queued", &self.outbox.queue.len())
            .field("server_address", &self.config.server_address)
            .finish()
    }
}

// ── Role handles ────────────────────────────────────────────────────

/// Host capabilities, borrowed from a [`Connector`] in the `Host` role.
///
/// Dereferences to [`HostState`] for the client list and signals.
pub struct HostHandle<'a> {
    state: &'a mut HostState,
    outbox: &'a mut Outbox,
}

impl HostHandle<'_> {
    /// Send `message` to the given clients, or to every client if `None`.
    pub fn send(&mut self, message: impl Into<Value>, client_ids: Option<Vec<ClientId>>) {
        self.outbox.push(Outbound::Frame(ClientFrame::Send {
            message: message.into(),
            client_ids,
        }));
    }

    /// Send `message` to every client.
    pub fn broadcast(&mut self, message: impl Into<Value>) {
        self.send(message, None);
    }
}

impl Deref for HostHandle<'_> {
    type Target = HostState;

    fn deref(&self) -> &HostState {
        self.state
    }
}

impl DerefMut for HostHandle<'_> {
    fn deref_mut(&mut self) -> &mut HostState {
        self.state
    }
}

/// Client capabilities, borrowed from a [`Connector`] in the `Client` role.
///
/// Dereferences to [`ClientState`] for the host id and message signal.
pub struct ClientHandle<'a> {
    state: &'a mut ClientState,
    outbox: &'a mut Outbox,
}

impl ClientHandle<'_> {
    /// Send `message` to the host. Messages sent before the join is confirmed
    /// are held and released, in order, once it is.
    pub fn send(&mut self, message: impl Into<Value>) {
        let message = message.into();
        if self.state.is_joined() {
            self.outbox.push(Outbound::Frame(ClientFrame::Send {
                message,
                client_ids: None,
            }));
        } else {
            self.state.held.push(message);
        }
    }
}

impl Deref for ClientHandle<'_> {
    type Target = ClientState;

    fn deref(&self) -> &ClientState {
        self.state
    }
}

impl DerefMut for ClientHandle<'_> {
    fn deref_mut(&mut self) -> &mut ClientState {
        self.state
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::Identifier;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn connector() -> Connector {
        Connector::new(NexusConfig::default().with_suppress_missed_warnings(true))
    }

    fn frames(connector: &mut Connector) -> Vec<Value> {
        connector
            .drain_outbound()
            .into_iter()
            .map(|item| match item {
                Outbound::Frame(frame) => serde_json::to_value(frame).unwrap(),
                Outbound::Close(info) => json!({"close": info.code}),
            })
            .collect()
    }

    fn deliver(connector: &mut Connector, frame: Value) {
        connector.handle_message(&frame.to_string());
    }

    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a WARN-level subscriber installed and return what it logged.
    fn capture_warnings(f: impl FnOnce()) -> String {
        let writer = CaptureWriter::default();
        let sink = writer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = writer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn loud_connector() -> Connector {
        Connector::new(NexusConfig::default())
    }

    #[test]
    fn starts_as_user_and_connecting() {
        let connector = connector();
        assert_eq!(connector.role(), RoleKind::User);
        assert_eq!(connector.link_state(), LinkState::Connecting);
        assert_eq!(connector.api_version(), "1.0.0");
    }

    #[test]
    fn change_role_drops_previous_role_state() {
        let mut connector = connector();
        connector.change_role(RoleKind::Host);
        connector
            .as_host_mut()
            .unwrap()
            .on_new_client()
            .subscribe(|_| {});
        assert!(connector.as_host().is_some());

        connector.change_role(RoleKind::Client);

        assert!(connector.as_host().is_none());
        assert!(connector.as_host_mut().is_none());
        assert!(connector.as_client().is_some());
        assert_eq!(connector.role(), RoleKind::Client);
    }

    #[test]
    fn change_role_named_rejects_unknown_role() {
        let mut connector = connector();
        let err = connector.change_role_named("Spectator").unwrap_err();
        assert!(matches!(err, NexusError::InvalidRole(_)));
        assert_eq!(connector.role(), RoleKind::User);

        connector.change_role_named("Dead").unwrap();
        assert_eq!(connector.role(), RoleKind::Dead);
    }

    #[test]
    fn transition_from_wrong_role_fails_fast() {
        let mut connector = connector();
        let err = connector
            .transition(RoleKind::Host, RoleKind::Client)
            .unwrap_err();
        assert!(matches!(
            err,
            NexusError::RoleMismatch {
                expected: RoleKind::Host,
                actual: RoleKind::User,
            }
        ));
        assert_eq!(connector.role(), RoleKind::User);
    }

    #[test]
    fn actions_before_open_are_flushed_in_order() {
        let mut connector = connector();
        connector.get_hosts().unwrap();
        connector.join("roomA").unwrap();
        assert!(!connector.has_outbound());
        assert!(frames(&mut connector).is_empty());

        connector.handle_open();

        assert!(connector.connected().is_succeeded());
        assert_eq!(
            frames(&mut connector),
            vec![
                json!({"type": "LIST"}),
                json!({"type": "JOIN", "name": "roomA"}),
            ]
        );
        assert!(frames(&mut connector).is_empty());
    }

    #[test]
    fn second_host_or_join_is_rejected() {
        let mut connector = connector();
        connector.host("lobby").unwrap();

        let err = connector.join("lobby").unwrap_err();
        assert!(matches!(
            err,
            NexusError::WrongRole {
                operation: "join",
                role: RoleKind::Host,
            }
        ));
        assert!(connector.host(1_u64).is_err());
        assert_eq!(connector.role(), RoleKind::Host);
    }

    #[test]
    fn hosting_records_identity() {
        let mut connector = connector();
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        connector
            .host("lobby")
            .unwrap()
            .then(move |info| *slot.lock().unwrap() = Some(info.clone()));
        connector.handle_open();

        deliver(&mut connector, json!({"type": "HOSTING", "id": 12, "name": "lobby"}));

        let host = connector.as_host().unwrap();
        assert_eq!(host.host_id(), Some(&Identifier::from(12_u64)));
        assert_eq!(host.host_name(), Some("lobby"));
        assert_eq!(
            seen.lock().unwrap().clone().unwrap().name.as_deref(),
            Some("lobby")
        );
    }

    #[test]
    fn host_send_targets_clients() {
        let mut connector = connector();
        connector.host("lobby").unwrap();
        connector.handle_open();
        let _ = frames(&mut connector);

        let mut host = connector.as_host_mut().unwrap();
        host.send("hi", Some(vec![Identifier::from(2_u64)]));
        host.broadcast(json!({"all": true}));

        assert_eq!(
            frames(&mut connector),
            vec![
                json!({"type": "SEND", "message": "hi", "clientIDs": [2]}),
                json!({"type": "SEND", "message": {"all": true}}),
            ]
        );
    }

    #[test]
    fn client_messages_wait_for_join_confirmation() {
        let mut connector = connector();
        connector.join("roomA").unwrap();
        connector.handle_open();
        connector.as_client_mut().unwrap().send("early");
        assert_eq!(
            frames(&mut connector),
            vec![json!({"type": "JOIN", "name": "roomA"})]
        );

        deliver(&mut connector, json!({"type": "JOINED", "host": 4}));
        connector.as_client_mut().unwrap().send("late");

        assert_eq!(
            frames(&mut connector),
            vec![
                json!({"type": "SEND", "message": "early"}),
                json!({"type": "SEND", "message": "late"}),
            ]
        );
        assert!(connector.as_client().unwrap().is_joined());
    }

    #[test]
    fn duplicate_and_unknown_client_notices_are_ignored() {
        let mut connector = connector();
        connector.host("lobby").unwrap();
        let joins = Arc::new(Mutex::new(0));
        let losses = Arc::new(Mutex::new(0));
        {
            let mut host = connector.as_host_mut().unwrap();
            let sink = Arc::clone(&joins);
            host.on_new_client().subscribe(move |_| *sink.lock().unwrap() += 1);
            let sink = Arc::clone(&losses);
            host.on_lost_client().subscribe(move |_| *sink.lock().unwrap() += 1);
        }
        connector.handle_open();

        deliver(&mut connector, json!({"type": "NEW_CLIENT", "clientID": 7, "request": {}}));
        deliver(&mut connector, json!({"type": "NEW_CLIENT", "clientID": 7, "request": {}}));
        deliver(&mut connector, json!({"type": "LOST_CLIENT", "clientID": 8}));

        assert_eq!(*joins.lock().unwrap(), 1);
        assert_eq!(*losses.lock().unwrap(), 0);
        assert_eq!(
            connector.as_host().unwrap().client_ids(),
            &[Identifier::from(7_u64)]
        );
    }

    #[test]
    fn rejected_join_discards_held_messages_and_falls_back() {
        let mut connector = connector();
        connector.join_or_host("roomB").unwrap();
        connector.as_client_mut().unwrap().send("lost");
        connector.handle_open();
        let _ = frames(&mut connector);

        deliver(&mut connector, json!({"type": "NO_SUCH_HOST"}));

        assert!(matches!(
            connector.joined().state().failure(),
            Some(NexusError::NoSuchHost { reason: None })
        ));
        assert_eq!(connector.role(), RoleKind::Host);
        assert!(connector.hosting().is_pending());
        assert_eq!(
            frames(&mut connector),
            vec![json!({"type": "HOST", "name": "roomB"})]
        );
    }

    #[test]
    fn open_and_error_are_observed_by_the_connector() {
        let logs = capture_warnings(|| {
            let mut connector = loud_connector();
            connector.get_hosts().unwrap();
            connector.handle_open();
            assert_eq!(frames(&mut connector), vec![json!({"type": "LIST"})]);
            connector.handle_error(NexusError::ConnectionFailed("reset".into()));
            assert!(connector.connected().is_failed());
        });
        assert!(!logs.contains("unhandled deferred event"), "{logs}");

        // An unobserved LIST still warns.
        let logs = capture_warnings(|| {
            let mut connector = loud_connector();
            connector.handle_open();
            deliver(&mut connector, json!({"type": "LIST", "payload": []}));
        });
        assert!(logs.contains("unhandled deferred event"), "{logs}");
        assert!(logs.contains("on_list"), "{logs}");
    }

    #[test]
    fn join_or_host_fallback_does_not_warn_about_rejection() {
        let logs = capture_warnings(|| {
            let mut connector = loud_connector();
            connector.join_or_host("roomC").unwrap();
            connector.handle_open();
            deliver(&mut connector, json!({"type": "NO_SUCH_HOST", "reason": "none"}));
            assert_eq!(connector.role(), RoleKind::Host);
            assert!(connector.joined().is_failed());
        });
        assert!(!logs.contains("joined.on_error"), "{logs}");

        // A plain join has no fallback, so an unobserved rejection warns.
        let logs = capture_warnings(|| {
            let mut connector = loud_connector();
            connector.join("roomC").unwrap();
            connector.handle_open();
            deliver(&mut connector, json!({"type": "NO_SUCH_HOST"}));
        });
        assert!(logs.contains("joined.on_error"), "{logs}");
    }

    #[test]
    fn fractional_and_negative_client_ids_are_tracked() {
        let mut connector = connector();
        connector.host("lobby").unwrap();
        connector.handle_open();

        deliver(&mut connector, json!({"type": "NEW_CLIENT", "clientID": 1.5, "request": {}}));
        deliver(&mut connector, json!({"type": "NEW_CLIENT", "clientID": -2, "request": {}}));
        assert_eq!(
            connector.as_host().unwrap().client_ids(),
            &[Identifier::Number(serde_json::Number::from_f64(1.5).unwrap()), Identifier::from(-2_i64)]
        );

        deliver(&mut connector, json!({"type": "LOST_CLIENT", "clientID": 1.5}));
        assert_eq!(
            connector.as_host().unwrap().client_ids(),
            &[Identifier::from(-2_i64)]
        );
    }

    #[test]
    fn client_message_triggers_on_message() {
        let mut connector = connector();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connector.join("roomA").unwrap();
        connector
            .as_client_mut()
            .unwrap()
            .on_message()
            .subscribe(move |m| sink.lock().unwrap().push(m.clone()));
        connector.handle_open();

        deliver(&mut connector, json!({"type": "JOINED", "host": "abc"}));
        deliver(&mut connector, json!({"type": "MESSAGE", "message": {"n": 1}}));

        assert_eq!(*seen.lock().unwrap(), vec![json!({"n": 1})]);
    }

    #[test]
    fn unrecognized_role_frames_fall_through_to_base_handler() {
        let mut connector = connector();
        let lists = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lists);
        connector
            .on_list()
            .subscribe(move |p| sink.lock().unwrap().push(p.clone()));
        connector.host("lobby").unwrap();
        connector.handle_open();

        deliver(&mut connector, json!({"type": "LIST", "payload": [{"id": 1}]}));
        // A client-only frame while hosting is logged and ignored.
        deliver(&mut connector, json!({"type": "JOINED", "host": 1}));
        deliver(&mut connector, json!({"type": "NOT_A_FRAME"}));
        connector.handle_message("not json");

        assert_eq!(*lists.lock().unwrap(), vec![json!([{"id": 1}])]);
        assert_eq!(connector.role(), RoleKind::Host);
        assert!(connector.joined().is_pending());
    }

    #[test]
    fn server_info_is_forwarded() {
        let mut connector = connector();
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        connector
            .on_server_info()
            .subscribe(move |info| *slot.lock().unwrap() = info.api_version.clone());
        connector.handle_open();

        deliver(&mut connector, json!({"type": "SERVER_INFO", "apiVersion": "2.0.0"}));

        assert_eq!(seen.lock().unwrap().as_deref(), Some("2.0.0"));
        assert_eq!(connector.role(), RoleKind::User);
    }

    #[test]
    fn transport_error_collapses_to_dead() {
        let mut connector = connector();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        connector
            .host("lobby")
            .unwrap()
            .on_error(move |e| sink.lock().unwrap().push(e.to_string()));

        connector.handle_error(NexusError::ConnectionFailed("refused".into()));

        assert_eq!(connector.role(), RoleKind::Dead);
        assert_eq!(connector.link_state(), LinkState::Failed);
        assert!(connector.connected().is_failed());
        assert!(connector.hosting().is_failed());
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert!(connector.drain_outbound().is_empty());
        assert!(matches!(connector.get_hosts(), Err(NexusError::NotConnected)));
        assert!(matches!(
            connector.join("x"),
            Err(NexusError::WrongRole {
                role: RoleKind::Dead,
                ..
            })
        ));
    }

    #[test]
    fn error_after_open_overwrites_connected_success() {
        let mut connector = connector();
        connector.handle_open();
        assert!(connector.connected().is_succeeded());

        connector.handle_error(NexusError::TransportReceive("reset".into()));

        assert!(connector.connected().is_failed());
        assert_eq!(connector.role(), RoleKind::Dead);
    }

    #[test]
    fn close_fires_on_close_and_fails_pending_join() {
        let mut connector = connector();
        let closes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&closes);
        connector
            .on_close()
            .subscribe(move |info| sink.lock().unwrap().push(info.clone()));
        connector.join("roomA").unwrap();
        connector.handle_open();

        connector.handle_close(CloseInfo::new(1001, "going away"));
        connector.handle_close(CloseInfo::new(1001, "again"));

        assert_eq!(
            *closes.lock().unwrap(),
            vec![CloseInfo::new(1001, "going away")]
        );
        assert!(connector.connected().is_succeeded());
        assert!(matches!(
            connector.joined().state().failure(),
            Some(NexusError::ConnectionClosed { code: 1001, .. })
        ));
        assert_eq!(connector.role(), RoleKind::Dead);
    }

    #[test]
    fn close_is_queued_until_open() {
        let mut connector = connector();
        connector.close_default().unwrap();
        assert!(connector.on_close().has_subscribers());
        connector.handle_open();

        assert_eq!(
            connector.drain_outbound(),
            vec![Outbound::Close(CloseInfo::new(1000, DEFAULT_CLOSE_REASON))]
        );
    }
}
