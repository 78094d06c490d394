use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Server → Client message kinds pushed over the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Activity,
    Stats,
    Alert,
    ChartUpdate,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Activity,
        MessageKind::Stats,
        MessageKind::Alert,
        MessageKind::ChartUpdate,
    ];

    /// Wire name used in the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Activity => "activity",
            MessageKind::Stats => "stats",
            MessageKind::Alert => "alert",
            MessageKind::ChartUpdate => "chart_update",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activity" => Ok(MessageKind::Activity),
            "stats" => Ok(MessageKind::Stats),
            "alert" => Ok(MessageKind::Alert),
            "chart_update" => Ok(MessageKind::ChartUpdate),
            other => Err(DecodeError::UnknownType(other.to_string())),
        }
    }
}

/// Server → Client: decoded live push.
///
/// The payload is opaque here; routing only looks at the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Activity(Value),
    Stats(Value),
    Alert(Value),
    ChartUpdate(Value),
}

impl InboundMessage {
    pub fn new(kind: MessageKind, data: Value) -> Self {
        match kind {
            MessageKind::Activity => InboundMessage::Activity(data),
            MessageKind::Stats => InboundMessage::Stats(data),
            MessageKind::Alert => InboundMessage::Alert(data),
            MessageKind::ChartUpdate => InboundMessage::ChartUpdate(data),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMessage::Activity(_) => MessageKind::Activity,
            InboundMessage::Stats(_) => MessageKind::Stats,
            InboundMessage::Alert(_) => MessageKind::Alert,
            InboundMessage::ChartUpdate(_) => MessageKind::ChartUpdate,
        }
    }

    pub fn data(&self) -> &Value {
        match self {
            InboundMessage::Activity(data)
            | InboundMessage::Stats(data)
            | InboundMessage::Alert(data)
            | InboundMessage::ChartUpdate(data) => data,
        }
    }

    /// Parse a raw text frame into a typed message
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let envelope: RawEnvelope =
            serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let kind = envelope
            .kind
            .ok_or(DecodeError::MissingType)?
            .parse::<MessageKind>()?;
        Ok(InboundMessage::new(kind, envelope.data))
    }
}

/// Envelope as it arrives on the wire, before the type is validated
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Reasons an inbound frame is discarded
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Malformed(String),
    MissingType,
    UnknownType(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed(e) => write!(f, "malformed envelope: {}", e),
            DecodeError::MissingType => write!(f, "envelope has no type field"),
            DecodeError::UnknownType(t) => write!(f, "unknown message type '{}'", t),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Subscription channels offered by the dashboard endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Activity,
    Stats,
    Alerts,
    Charts,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Activity,
        Channel::Stats,
        Channel::Alerts,
        Channel::Charts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Activity => "activity",
            Channel::Stats => "stats",
            Channel::Alerts => "alerts",
            Channel::Charts => "charts",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { channel: Channel },
}
