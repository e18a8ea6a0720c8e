//! Message framing for the dispatch socket.
//!
//! Every frame is a JSON object. Outbound frames are internally tagged on `"type"`:
//!
//! ```json
//! {"type":"register","user_id":7,"username":"anna"}
//! {"type":"getStatus","user_id":7}
//! {"type":"updateStatus","user_id":7,"status":"online"}
//! {"type":"location","user_id":7,"lat":60.7,"lon":28.75,"captured_at":"2024-05-01T10:00:00Z"}
//! ```
//!
//! Inbound frames are less uniform. Order pushes come nested, flattened, or as a bare
//! order object without any `type`:
//!
//! ```json
//! {"type":"order-upsert","order":{"id":17,"from":"A","to":"B"}}
//! {"type":"order-upsert","id":17,"canceledAt":"2024-05-01T10:05:00Z"}
//! {"orderId":"17","price":230}
//! {"type":"status-ack","status":"online"}
//! ```
//!
//! [`parse_inbound`] folds all of these into the closed [`InboundMessage`] enum.

use crate::channel::ParseError;
use crate::model::{LocationSample, OrderPatch, PresenceStatus, SessionIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "register")]
    Register {
        user_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    #[serde(rename = "getStatus")]
    GetStatus { user_id: i64 },
    #[serde(rename = "updateStatus")]
    UpdateStatus {
        user_id: i64,
        status: PresenceStatus,
    },
    #[serde(rename = "location")]
    Location {
        user_id: i64,
        lat: f64,
        lon: f64,
        captured_at: DateTime<Utc>,
    },
}

impl OutboundMessage {
    pub fn register(identity: &SessionIdentity) -> Self {
        Self::Register {
            user_id: identity.user_id,
            username: identity.username.clone(),
        }
    }

    pub fn location(identity: &SessionIdentity, sample: &LocationSample) -> Self {
        Self::Location {
            user_id: identity.user_id,
            lat: sample.lat,
            lon: sample.lon,
            captured_at: sample.captured_at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::GetStatus { .. } => "getStatus",
            Self::UpdateStatus { .. } => "updateStatus",
            Self::Location { .. } => "location",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    OrderUpsert(OrderPatch),
    StatusAck { status: PresenceStatus },
    RegisterAck,
}

#[derive(Deserialize)]
struct StatusAck {
    status: PresenceStatus,
}

/// Parses one text frame. `Ok(None)` means a well-formed message of a type we do not
/// handle.
pub fn parse_inbound(text: &str) -> Result<Option<InboundMessage>, ParseError> {
    let Value::Object(mut object) = serde_json::from_str::<Value>(text)? else {
        return Err(ParseError::NotAnObject);
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned);
    match kind.as_deref() {
        Some("order-upsert") => {
            let payload = match object.remove("order") {
                Some(order) => order,
                None => {
                    object.remove("type");
                    Value::Object(object)
                }
            };
            order_patch(payload).map(|patch| Some(InboundMessage::OrderUpsert(patch)))
        }
        Some("status-ack") | Some("statusUpdate") => {
            let ack: StatusAck = serde_json::from_value(Value::Object(object))?;
            Ok(Some(InboundMessage::StatusAck { status: ack.status }))
        }
        Some("register-ack") => Ok(Some(InboundMessage::RegisterAck)),
        Some(other) => {
            debug!(kind = other, "Ignoring unknown message type");
            Ok(None)
        }
        None if looks_like_order(&object) => order_patch(Value::Object(object))
            .map(|patch| Some(InboundMessage::OrderUpsert(patch))),
        None => Err(ParseError::MissingType),
    }
}

/// Decodes a binary frame as UTF-8 text.
pub fn decode_binary(bytes: Vec<u8>) -> Result<String, ParseError> {
    String::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)
}

fn looks_like_order(object: &Map<String, Value>) -> bool {
    object.contains_key("id") || object.contains_key("orderId")
}

fn order_patch(payload: Value) -> Result<OrderPatch, ParseError> {
    let patch: OrderPatch =
        serde_json::from_value(payload).map_err(|e| ParseError::InvalidOrder(e.to_string()))?;
    if patch.id.is_none() {
        return Err(ParseError::InvalidOrder("missing id".into()));
    }
    Ok(patch)
}
