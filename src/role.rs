//! Connector roles and their role-scoped state.
//!
//! A connector is always in exactly one [`Role`]. Role-scoped data (the host's
//! client list, the client's message signal, ...) lives inside the variant, so
//! replacing the variant drops every attribute of the previous role at once.
//! [`RoleKind`] doubles as the role registry: it maps role names to the factory
//! that builds a fresh state for that role.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::NexusError;
use crate::protocol::{ClientId, HostDescriptor, HostId};
use crate::signal::DeferredSignal;

/// Name of a connector role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    /// Terminal, inert role after the transport failed or closed.
    Dead,
    /// Initial, undecided role. Can host or join.
    User,
    /// Registered (or registering) as a host.
    Host,
    /// Joined (or joining) a host.
    Client,
}

impl RoleKind {
    /// Every registered role.
    pub const ALL: [RoleKind; 4] = [Self::Dead, Self::User, Self::Host, Self::Client];

    /// Registry name of the role.
    pub fn name(self) -> &'static str {
        match self {
            Self::Dead => "Dead",
            Self::User => "User",
            Self::Host => "Host",
            Self::Client => "Client",
        }
    }

    /// Build a fresh state for this role.
    pub fn instantiate(self, suppress_missed_warnings: bool) -> Role {
        match self {
            Self::Dead => Role::Dead,
            Self::User => Role::User,
            Self::Host => Role::Host(HostState::new(suppress_missed_warnings)),
            Self::Client => Role::Client(ClientState::new(suppress_missed_warnings)),
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoleKind {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| NexusError::InvalidRole(s.to_owned()))
    }
}

/// The active role together with its role-scoped state.
#[derive(Debug)]
pub enum Role {
    /// No capabilities.
    Dead,
    /// Undecided.
    User,
    /// Hosting.
    Host(HostState),
    /// Joined to a host.
    Client(ClientState),
}

impl Role {
    /// Name of this role.
    pub fn kind(&self) -> RoleKind {
        match self {
            Self::Dead => RoleKind::Dead,
            Self::User => RoleKind::User,
            Self::Host(_) => RoleKind::Host,
            Self::Client(_) => RoleKind::Client,
        }
    }
}

/// State that exists only while the connector is a host.
#[derive(Debug)]
pub struct HostState {
    pub(crate) host_id: Option<HostId>,
    pub(crate) host_name: Option<String>,
    pub(crate) client_ids: Vec<ClientId>,
    pub(crate) on_new_client: DeferredSignal<(ClientId, Value)>,
    pub(crate) on_lost_client: DeferredSignal<ClientId>,
    pub(crate) on_message: DeferredSignal<(Value, ClientId)>,
}

impl HostState {
    fn new(suppressed: bool) -> Self {
        Self {
            host_id: None,
            host_name: None,
            client_ids: Vec::new(),
            on_new_client: DeferredSignal::warning("<Host>.on_new_client", suppressed),
            on_lost_client: DeferredSignal::warning("<Host>.on_lost_client", suppressed),
            on_message: DeferredSignal::warning("<Host>.on_message", suppressed),
        }
    }

    /// Identifier assigned by the server once hosting is confirmed.
    pub fn host_id(&self) -> Option<&HostId> {
        self.host_id.as_ref()
    }

    /// Name registered by the server once hosting is confirmed.
    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    /// Connected clients, in join order.
    pub fn client_ids(&self) -> &[ClientId] {
        &self.client_ids
    }

    /// Fires with `(client_id, join_request)` when a client joins.
    pub fn on_new_client(&mut self) -> &mut DeferredSignal<(ClientId, Value)> {
        &mut self.on_new_client
    }

    /// Fires with the client id when a client leaves.
    pub fn on_lost_client(&mut self) -> &mut DeferredSignal<ClientId> {
        &mut self.on_lost_client
    }

    /// Fires with `(message, client_id)` for every message from a client.
    pub fn on_message(&mut self) -> &mut DeferredSignal<(Value, ClientId)> {
        &mut self.on_message
    }

    /// Record a joined client. Returns `false` if it was already known.
    pub(crate) fn add_client(&mut self, client_id: &ClientId) -> bool {
        if self.client_ids.contains(client_id) {
            return false;
        }
        self.client_ids.push(client_id.clone());
        true
    }

    /// Forget a client. Returns `false` if it was not known.
    pub(crate) fn remove_client(&mut self, client_id: &ClientId) -> bool {
        let before = self.client_ids.len();
        self.client_ids.retain(|id| id != client_id);
        self.client_ids.len() != before
    }
}

/// State that exists only while the connector is a client.
#[derive(Debug)]
pub struct ClientState {
    pub(crate) host_id: Option<HostId>,
    pub(crate) on_message: DeferredSignal<Value>,
    /// Messages sent before the join was confirmed.
    pub(crate) held: Vec<Value>,
    /// Descriptor to host with if the join is rejected (`join_or_host`).
    pub(crate) fallback: Option<HostDescriptor>,
}

impl ClientState {
    fn new(suppressed: bool) -> Self {
        Self {
            host_id: None,
            on_message: DeferredSignal::warning("<Client>.on_message", suppressed),
            held: Vec::new(),
            fallback: None,
        }
    }

    /// Identifier of the joined host, once confirmed.
    pub fn host_id(&self) -> Option<&HostId> {
        self.host_id.as_ref()
    }

    /// Returns `true` once the server confirmed the join.
    pub fn is_joined(&self) -> bool {
        self.host_id.is_some()
    }

    /// Fires with every message relayed from the host.
    pub fn on_message(&mut self) -> &mut DeferredSignal<Value> {
        &mut self.on_message
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::Identifier;

    #[test]
    fn registry_resolves_every_role_name() {
        for kind in RoleKind::ALL {
            let parsed: RoleKind = kind.name().parse().unwrap();
            assert_eq!(parsed, kind);
            assert_eq!(kind.instantiate(true).kind(), kind);
        }
    }

    #[test]
    fn registry_rejects_unknown_names() {
        let err = "Spectator".parse::<RoleKind>().unwrap_err();
        assert!(matches!(err, NexusError::InvalidRole(name) if name == "Spectator"));
        assert!("host".parse::<RoleKind>().is_err());
    }

    #[test]
    fn host_client_list_keeps_join_order_and_uniqueness() {
        let mut host = HostState::new(true);
        assert!(host.add_client(&Identifier::from(3_u64)));
        assert!(host.add_client(&Identifier::from(1_u64)));
        assert!(!host.add_client(&Identifier::from(3_u64)));
        assert_eq!(
            host.client_ids(),
            &[Identifier::from(3_u64), Identifier::from(1_u64)]
        );

        assert!(host.remove_client(&Identifier::from(3_u64)));
        assert!(!host.remove_client(&Identifier::from(42_u64)));
        assert_eq!(host.client_ids(), &[Identifier::from(1_u64)]);
    }

    #[test]
    fn fresh_client_is_not_joined() {
        let client = ClientState::new(true);
        assert!(!client.is_joined());
        assert!(client.host_id().is_none());
    }
}
