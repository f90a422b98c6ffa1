//! Error types for the Nexus client.

use thiserror::Error;

use crate::role::RoleKind;

/// Errors that can occur when using the Nexus client.
///
/// Usage errors (`InvalidRole`, `RoleMismatch`, `WrongRole`, `InvalidDescriptor`) are
/// returned synchronously from the offending call. Connection and protocol failures
/// are delivered through the failure path of the relevant
/// [`DeferredOutcome`](crate::outcome::DeferredOutcome).
#[derive(Debug, Error)]
pub enum NexusError {
    /// A role name that is not present in the role registry.
    #[error("invalid role name: {0:?}")]
    InvalidRole(String),

    /// A role transition was issued against a connector whose active role differs.
    #[error("cannot leave role {expected} while the connector is {actual}")]
    RoleMismatch {
        /// Role the caller believed to be active.
        expected: RoleKind,
        /// Role that is actually active.
        actual: RoleKind,
    },

    /// The operation is not available in the active role.
    #[error("{operation} is not available in the {role} role")]
    WrongRole {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Role that was active when the call was made.
        role: RoleKind,
    },

    /// A host/join descriptor that is neither a name, a numeric id nor an object.
    #[error("invalid host descriptor: {0}")]
    InvalidDescriptor(String),

    /// The transport failed to open or errored mid-session.
    #[error("server connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport was closed.
    #[error("connection closed ({code}): {reason}")]
    ConnectionClosed {
        /// Close code reported by the transport.
        code: u16,
        /// Close reason reported by the transport.
        reason: String,
    },

    /// The server has no host matching the join request.
    #[error("cannot connect to host{}", reason_suffix(.reason))]
    NoSuchHost {
        /// Optional explanation supplied by the server.
        reason: Option<String>,
    },

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection is already closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Attempted an operation that requires a live connection.
    #[error("not connected to server")]
    NotConnected,

    /// Failed to serialize or deserialize a frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

impl NexusError {
    /// Returns `true` for programmer misuse that should be fixed during development.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRole(_)
                | Self::RoleMismatch { .. }
                | Self::WrongRole { .. }
                | Self::InvalidDescriptor(_)
        )
    }
}

/// A specialized [`Result`] type for Nexus client operations.
pub type Result<T> = std::result::Result<T, NexusError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn no_such_host_message_includes_reason() {
        let plain = NexusError::NoSuchHost { reason: None };
        assert_eq!(plain.to_string(), "cannot connect to host");

        let detailed = NexusError::NoSuchHost {
            reason: Some("room closed".into()),
        };
        assert_eq!(detailed.to_string(), "cannot connect to host: room closed");
    }

    #[test]
    fn usage_errors_are_classified() {
        assert!(NexusError::InvalidRole("Spectator".into()).is_usage_error());
        assert!(NexusError::WrongRole {
            operation: "host",
            role: RoleKind::Dead,
        }
        .is_usage_error());
        assert!(!NexusError::NotConnected.is_usage_error());
        assert!(!NexusError::NoSuchHost { reason: None }.is_usage_error());
    }
}
