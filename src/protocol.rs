//! Wire protocol between the requesting context and the background context
//!
//! Every inbound frame carries an explicit `kind`, so routing never
//! depends on local channel state:
//!
//! - `REPLY` answers exactly one outbound frame, matched by correlation id
//! - `HANDSHAKE_ACK` opens the comms channel and lists known named syncs
//! - `PUSH` carries a JSON-encoded completion notice for one sync

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{FetchSyncError, Result};
use crate::sync::{SyncDescriptor, SyncId};

/// Requests sent to the background context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    OpenComms,
    RegisterSync(SyncDescriptor),
    CancelSync { id: SyncId },
    CancelAllSyncs,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::OpenComms => "OPEN_COMMS",
            ClientMessage::RegisterSync(_) => "REGISTER_SYNC",
            ClientMessage::CancelSync { .. } => "CANCEL_SYNC",
            ClientMessage::CancelAllSyncs => "CANCEL_ALL_SYNCS",
        }
    }
}

/// Outbound envelope; the correlation id is echoed by the matching reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub correlation_id: Uuid,
    pub message: ClientMessage,
}

impl OutboundFrame {
    pub fn new(message: ClientMessage) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            message,
        }
    }
}

/// Frames delivered by the background context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundFrame {
    Reply {
        correlation_id: Uuid,
        #[serde(default)]
        body: Value,
    },
    HandshakeAck {
        #[serde(default)]
        syncs: Vec<SyncDescriptor>,
    },
    Push {
        payload: String,
    },
}

/// Error carried by a reply body, if any. Absent, null and `false` do not count.
pub fn reply_error(body: &Value) -> Option<&Value> {
    match body.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(error) => Some(error),
    }
}

pub const PUSH_SUCCESS: &str = "SUCCESS";
pub const PUSH_FAILURE: &str = "FAILURE";

/// Payload of a push delivery: `{type, data: {id, response?, error?}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: PushData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushData {
    pub id: SyncId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl PushMessage {
    pub fn success(id: SyncId, response: Value) -> Self {
        Self {
            kind: PUSH_SUCCESS.to_string(),
            data: PushData {
                id,
                response: Some(response),
                error: None,
            },
        }
    }

    pub fn failure(id: SyncId, error: Value) -> Self {
        Self {
            kind: PUSH_FAILURE.to_string(),
            data: PushData {
                id,
                response: None,
                error: Some(error),
            },
        }
    }

    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| FetchSyncError::MalformedMessage(e.to_string()))
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| FetchSyncError::Codec(e.to_string()))
    }

    /// Wrap as an inbound `PUSH` frame
    pub fn into_frame(self) -> Result<InboundFrame> {
        Ok(InboundFrame::Push {
            payload: self.encode()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_shape() {
        let id = SyncId::new();
        let cancel = serde_json::to_value(ClientMessage::CancelSync { id }).unwrap();
        assert_eq!(cancel, json!({"type": "CANCEL_SYNC", "data": {"id": id.to_string()}}));

        let open = serde_json::to_value(ClientMessage::OpenComms).unwrap();
        assert_eq!(open, json!({"type": "OPEN_COMMS"}));
        assert_eq!(ClientMessage::CancelAllSyncs.kind(), "CANCEL_ALL_SYNCS");
    }

    #[test]
    fn test_inbound_frame_discriminant() {
        let frame: InboundFrame =
            serde_json::from_value(json!({"kind": "HANDSHAKE_ACK"})).unwrap();
        assert_eq!(frame, InboundFrame::HandshakeAck { syncs: vec![] });

        let id = Uuid::new_v4();
        let reply: InboundFrame = serde_json::from_value(json!({
            "kind": "REPLY",
            "correlation_id": id,
            "body": {"ok": true}
        }))
        .unwrap();
        assert!(matches!(reply, InboundFrame::Reply { correlation_id, .. } if correlation_id == id));
    }

    #[test]
    fn test_reply_error_presence() {
        assert!(reply_error(&json!({"error": "boom"})).is_some());
        assert!(reply_error(&json!({"error": {"code": 1}})).is_some());
        assert!(reply_error(&json!({"error": null})).is_none());
        assert!(reply_error(&json!({})).is_none());
        assert!(reply_error(&Value::Null).is_none());
    }

    #[test]
    fn test_push_message_wire_format() {
        let id = SyncId::new();
        let text = PushMessage::success(id, json!({"status": 200})).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "SUCCESS");
        assert_eq!(value["data"]["id"], id.to_string());
        assert!(value["data"].get("error").is_none());

        assert!(matches!(
            PushMessage::parse("{not json"),
            Err(FetchSyncError::MalformedMessage(_))
        ));
    }
}
