//! Wire-compatible frame types for the Nexus relay protocol.
//!
//! Every frame is a single JSON object tagged by a `"type"` field in
//! `SCREAMING_SNAKE_CASE`. Outbound requests are [`ClientFrame`]s; inbound
//! notifications are [`ServerFrame`]s. Client identifiers travel as `clientID`
//! on inbound frames and as a `clientIDs` array on `SEND`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{NexusError, Result};

// ── Identifiers ─────────────────────────────────────────────────────

/// A server-assigned identifier. The relay hands out numbers, but names are
/// accepted as well.
///
/// Any JSON number is kept as sent, including negative and fractional ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    /// Numeric identifier.
    Number(Number),
    /// Textual identifier.
    Text(String),
}

/// Identifier of a host, assigned by the server.
pub type HostId = Identifier;

/// Identifier of a client connected to a host, assigned by the server.
pub type ClientId = Identifier;

impl From<u64> for Identifier {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Number> for Identifier {
    fn from(value: Number) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ── Host descriptors ────────────────────────────────────────────────

/// Selects which host to create or join.
///
/// A name becomes `{"name": ...}`, a number becomes `{"id": ...}`, and a field
/// map is forwarded verbatim (minus any `type` key, which the request sets).
///
/// ```
/// use nexus_client::protocol::HostDescriptor;
///
/// let by_name = HostDescriptor::from("lobby");
/// assert_eq!(by_name.into_fields()["name"], "lobby");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum HostDescriptor {
    /// Host selected by display name.
    Name(String),
    /// Host selected by numeric id.
    Id(Number),
    /// Arbitrary request fields.
    Fields(Map<String, Value>),
}

impl HostDescriptor {
    /// Normalize into the request body fields.
    pub fn into_fields(self) -> Map<String, Value> {
        match self {
            Self::Name(name) => {
                let mut fields = Map::new();
                fields.insert("name".into(), Value::String(name));
                fields
            }
            Self::Id(id) => {
                let mut fields = Map::new();
                fields.insert("id".into(), Value::Number(id));
                fields
            }
            Self::Fields(mut fields) => {
                fields.remove("type");
                fields
            }
        }
    }
}

impl From<&str> for HostDescriptor {
    fn from(value: &str) -> Self {
        Self::Name(value.to_owned())
    }
}

impl From<String> for HostDescriptor {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<u64> for HostDescriptor {
    fn from(value: u64) -> Self {
        Self::Id(value.into())
    }
}

impl From<i64> for HostDescriptor {
    fn from(value: i64) -> Self {
        Self::Id(value.into())
    }
}

impl From<Map<String, Value>> for HostDescriptor {
    fn from(value: Map<String, Value>) -> Self {
        Self::Fields(value)
    }
}

impl TryFrom<Value> for HostDescriptor {
    type Error = NexusError;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::String(name) => Ok(Self::Name(name)),
            Value::Number(n) => Ok(Self::Id(n)),
            Value::Object(fields) => Ok(Self::Fields(fields)),
            other => Err(NexusError::InvalidDescriptor(other.to_string())),
        }
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// Confirmation carried by a `HOSTING` frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostingInfo {
    /// Identifier the server assigned to this host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<HostId>,
    /// Display name the server registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Server details carried by a `SERVER_INFO` frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// API version the server implements, as `major.minor.patch`.
    #[serde(
        rename = "apiVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub api_version: Option<String>,
    /// Any other fields the server reports.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Close code and reason of a finished connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close status code (1000 = normal closure).
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseInfo {
    /// Code used when the local side closes without specifying one.
    pub const NORMAL: u16 = 1000;
    /// Code used when the peer closed without a status.
    pub const NO_STATUS: u16 = 1005;
    /// Code used when the connection dropped without a close handshake.
    pub const ABNORMAL: u16 = 1006;

    /// Create a close record.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

// ── Frames ──────────────────────────────────────────────────────────

/// Requests sent from the connector to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientFrame {
    /// Register as a host.
    Host(Map<String, Value>),
    /// Join an existing host.
    Join(Map<String, Value>),
    /// Relay a message. From a host, `client_ids` limits the recipients;
    /// `None` broadcasts to every client.
    Send {
        message: Value,
        #[serde(rename = "clientIDs", default, skip_serializing_if = "Option::is_none")]
        client_ids: Option<Vec<ClientId>>,
    },
    /// Request the host listing.
    List,
}

impl ClientFrame {
    /// Encode as the JSON text sent over the transport.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Notifications sent from the server to the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerFrame {
    /// The join request was accepted.
    Joined { host: HostId },
    /// No host matches the join request.
    NoSuchHost {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Message relayed from the host to this client.
    Message {
        #[serde(default)]
        message: Value,
    },
    /// The host registration was accepted.
    Hosting(HostingInfo),
    /// A client joined this host. `request` is the client's join request.
    NewClient {
        #[serde(rename = "clientID")]
        client_id: ClientId,
        #[serde(default)]
        request: Value,
    },
    /// A client left this host.
    LostClient {
        #[serde(rename = "clientID")]
        client_id: ClientId,
    },
    /// Message relayed from a client to this host.
    FromClient {
        #[serde(default)]
        message: Value,
        #[serde(rename = "clientID")]
        client_id: ClientId,
    },
    /// Result of a `LIST` request.
    List {
        #[serde(default)]
        payload: Value,
    },
    /// Server version and capabilities.
    ServerInfo(ServerInfo),
    /// Any frame kind this client does not know.
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    /// Decode one JSON text frame received from the server.
    ///
    /// Unknown `type` tags decode as [`ServerFrame::Unknown`]; malformed JSON
    /// or a missing required field is a [`NexusError::Serialization`].
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Wire tag of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "JOINED",
            Self::NoSuchHost { .. } => "NO_SUCH_HOST",
            Self::Message { .. } => "MESSAGE",
            Self::Hosting(_) => "HOSTING",
            Self::NewClient { .. } => "NEW_CLIENT",
            Self::LostClient { .. } => "LOST_CLIENT",
            Self::FromClient { .. } => "FROM_CLIENT",
            Self::List { .. } => "LIST",
            Self::ServerInfo(_) => "SERVER_INFO",
            Self::Unknown => "UNKNOWN",
        }
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
    use serde_json::json;

    #[test]
    fn descriptor_name_becomes_name_field() {
        let fields = HostDescriptor::from("roomA").into_fields();
        assert_eq!(Value::Object(fields), json!({"name": "roomA"}));
    }

    #[test]
    fn descriptor_number_becomes_id_field() {
        let fields = HostDescriptor::from(12_u64).into_fields();
        assert_eq!(Value::Object(fields), json!({"id": 12}));
    }

    #[test]
    fn descriptor_object_passes_through_without_type() {
        let descriptor =
            HostDescriptor::try_from(json!({"name": "r", "max": 4, "type": "BOGUS"})).unwrap();
        assert_eq!(
            Value::Object(descriptor.into_fields()),
            json!({"name": "r", "max": 4})
        );
    }

    #[test]
    fn descriptor_rejects_other_json_kinds() {
        for bad in [json!(null), json!(true), json!([1, 2])] {
            let err = HostDescriptor::try_from(bad).unwrap_err();
            assert!(matches!(err, NexusError::InvalidDescriptor(_)));
        }
    }

    #[test]
    fn join_frame_wire_shape() {
        let frame = ClientFrame::Join(HostDescriptor::from("roomA").into_fields());
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "JOIN", "name": "roomA"})
        );
    }

    #[test]
    fn send_frame_omits_missing_client_ids() {
        let broadcast = ClientFrame::Send {
            message: json!("hi"),
            client_ids: None,
        };
        assert_eq!(
            serde_json::to_value(&broadcast).unwrap(),
            json!({"type": "SEND", "message": "hi"})
        );

        let targeted = ClientFrame::Send {
            message: json!({"x": 1}),
            client_ids: Some(vec![Identifier::from(3_u64), Identifier::from(9_u64)]),
        };
        assert_eq!(
            serde_json::to_value(&targeted).unwrap(),
            json!({"type": "SEND", "message": {"x": 1}, "clientIDs": [3, 9]})
        );
    }

    #[test]
    fn list_frame_is_bare_tag() {
        assert_eq!(
            serde_json::to_string(&ClientFrame::List).unwrap(),
            r#"{"type":"LIST"}"#
        );
    }

    #[test]
    fn decodes_host_side_frames() {
        let frame: ServerFrame =
            serde_json::from_str(r#"{"type":"NEW_CLIENT","clientID":7,"request":{"name":"a"}}"#)
                .unwrap();
        assert_eq!(
            frame,
            ServerFrame::NewClient {
                client_id: Identifier::from(7_u64),
                request: json!({"name": "a"}),
            }
        );

        let frame: ServerFrame =
            serde_json::from_str(r#"{"type":"HOSTING","id":5,"name":"lobby"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Hosting(HostingInfo {
                id: Some(Identifier::from(5_u64)),
                name: Some("lobby".into()),
            })
        );
    }

    #[test]
    fn decodes_joined_with_text_host() {
        let frame: ServerFrame = serde_json::from_str(r#"{"type":"JOINED","host":"abc"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Joined {
                host: Identifier::Text("abc".into()),
            }
        );
        assert_eq!(frame.kind(), "JOINED");
    }

    #[test]
    fn server_info_keeps_extra_fields() {
        let frame: ServerFrame =
            serde_json::from_str(r#"{"type":"SERVER_INFO","apiVersion":"1.2.3","motd":"hi"}"#)
                .unwrap();
        let ServerFrame::ServerInfo(info) = frame else {
            panic!("expected SERVER_INFO, got {frame:?}");
        };
        assert_eq!(info.api_version.as_deref(), Some("1.2.3"));
        assert_eq!(info.extra["motd"], "hi");
        assert!(!info.extra.contains_key("type"));
    }

    #[test]
    fn unknown_frame_kind_decodes_as_unknown() {
        let frame: ServerFrame =
            serde_json::from_str(r#"{"type":"SOMETHING_NEW","x":1}"#).unwrap();
        assert_eq!(frame, ServerFrame::Unknown);
    }

    #[test]
    fn descriptor_keeps_negative_and_fractional_ids() {
        for id in [json!(-3), json!(2.5)] {
            let fields = HostDescriptor::try_from(id.clone()).unwrap().into_fields();
            assert_eq!(Value::Object(fields), json!({ "id": id }));
        }
        let fields = HostDescriptor::from(-8_i64).into_fields();
        assert_eq!(Value::Object(fields), json!({"id": -8}));
    }

    #[test]
    fn identifiers_keep_any_json_number() {
        let frame: ServerFrame =
            serde_json::from_str(r#"{"type":"LOST_CLIENT","clientID":-4}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::LostClient {
                client_id: Identifier::from(-4_i64),
            }
        );

        let frame: ServerFrame =
            serde_json::from_str(r#"{"type":"JOINED","host":1.5}"#).unwrap();
        let ServerFrame::Joined { host } = frame else {
            panic!("expected JOINED, got {frame:?}");
        };
        assert_eq!(host.to_string(), "1.5");
        assert_eq!(serde_json::to_value(&host).unwrap(), json!(1.5));
    }

    #[test]
    fn malformed_text_is_a_serialization_error() {
        for text in ["not json", r#"{"type":"JOINED"}"#] {
            let err = ServerFrame::from_text(text).unwrap_err();
            assert!(matches!(err, NexusError::Serialization(_)), "{text}: {err:?}");
        }
        assert_eq!(
            ServerFrame::from_text(r#"{"type":"LIST","payload":[]}"#).unwrap(),
            ServerFrame::List { payload: json!([]) }
        );
    }

    #[test]
    fn client_frame_text_encoding() {
        assert_eq!(ClientFrame::List.to_text().unwrap(), r#"{"type":"LIST"}"#);
    }

    #[test]
    fn identifier_display() {
        assert_eq!(Identifier::from(7_u64).to_string(), "7");
        assert_eq!(Identifier::from("abc").to_string(), "abc");
    }
}
