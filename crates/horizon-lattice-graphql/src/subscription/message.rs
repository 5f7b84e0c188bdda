//! Wire envelope for the `graphql-ws` sub-protocol.
//!
//! Every frame on the socket is a JSON object:
//!
//! ```text
//! { "type": "<kind>", "id": "<subscriber id, optional>", "payload": <opaque, optional> }
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

use super::registry::SubscriberId;
use crate::error::Result;
use crate::graphql::GraphQLResponse;

/// The `type` discriminator of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Client -> Server: initialize the connection.
    ConnectionInit,
    /// Server -> Client: connection accepted.
    ConnectionAck,
    /// Server -> Client: connection rejected.
    ConnectionError,
    /// Client -> Server: shut the connection down.
    ConnectionTerminate,
    /// Client -> Server: start an operation.
    Start,
    /// Client -> Server: stop an operation.
    Stop,
    /// Server -> Client: operation result.
    Data,
    /// Server -> Client: operation failed.
    Error,
    /// Server -> Client: operation finished.
    Complete,
    /// Server -> Client: liveness signal.
    KeepAlive,
    /// Any type string this client does not know.
    Unknown(String),
}

impl MessageKind {
    /// The string used for this kind on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::ConnectionAck => "connection_ack",
            Self::ConnectionError => "connection_error",
            Self::ConnectionTerminate => "connection_terminate",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Data => "data",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::KeepAlive => "ka",
            Self::Unknown(other) => other,
        }
    }

    fn from_wire(value: &str) -> Self {
        match value {
            "connection_init" => Self::ConnectionInit,
            "connection_ack" => Self::ConnectionAck,
            "connection_error" => Self::ConnectionError,
            "connection_terminate" => Self::ConnectionTerminate,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "data" => Self::Data,
            "error" => Self::Error,
            "complete" => Self::Complete,
            "ka" => Self::KeepAlive,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&value))
    }
}

/// An opaque JSON payload.
///
/// The engine never looks inside a payload; callers decode it against
/// whatever shape they expect with [`Payload::decode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Box<RawValue>);

impl Payload {
    /// Serialize a value into a payload.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self(serde_json::value::to_raw_value(value)?))
    }

    /// Wrap raw JSON text, validating that it is well formed.
    pub fn from_json(json: impl Into<String>) -> Result<Self> {
        Ok(Self(RawValue::from_string(json.into())?))
    }

    /// The `{}` payload sent with `connection_init`.
    pub fn empty_object() -> Self {
        RawValue::from_string("{}".to_owned())
            .map(Self)
            .unwrap_or_else(|_| Self::null())
    }

    /// A JSON `null` payload.
    pub fn null() -> Self {
        Self(RawValue::NULL.to_owned())
    }

    /// The raw JSON text.
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Decode the payload as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(self.0.get())?)
    }

    /// Decode the payload as a GraphQL response (`{data, errors}`).
    pub fn to_response(&self) -> Result<GraphQLResponse> {
        self.decode()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame exchanged over the subscription socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Subscriber identifier, present on per-subscription frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Frame {
    /// Create a frame with no id and no payload.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            id: None,
            payload: None,
        }
    }

    /// `connection_init` carrying the given payload.
    pub fn connection_init(payload: Payload) -> Self {
        Self {
            payload: Some(payload),
            ..Self::new(MessageKind::ConnectionInit)
        }
    }

    /// `connection_terminate`.
    pub fn connection_terminate() -> Self {
        Self::new(MessageKind::ConnectionTerminate)
    }

    /// `start` for a subscriber.
    pub fn start(id: SubscriberId, payload: Payload) -> Self {
        Self {
            kind: MessageKind::Start,
            id: Some(id.to_string()),
            payload: Some(payload),
        }
    }

    /// `stop` for a subscriber.
    pub fn stop(id: SubscriberId) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::new(MessageKind::Stop)
        }
    }

    /// The subscriber this frame addresses, if the id is one this client issues.
    pub fn subscriber_id(&self) -> Option<SubscriberId> {
        self.id.as_deref().and_then(SubscriberId::parse)
    }

    /// Encode as JSON text.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode from JSON bytes (binary WebSocket messages).
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
