//! Wire protocol between the relay server and its clients.
//!
//! Every WebSocket text frame carries one JSON [`Frame`]:
//!
//! ```json
//! { "event": "chat", "data": { "nickname": "alice", "message": "hi" }, "ack": 1 }
//! ```
//!
//! `data` stays a raw JSON value on the frame so each side validates the
//! payload for the event it received.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Chat events in both directions.
pub const CHAT_EVENT: &str = "chat";
/// Server → sender, application-level error for a rejected chat event.
pub const EXCEPTION_EVENT: &str = "exception";
/// Server → sender, acknowledgment for a chat event that carried an ack id.
pub const ACK_EVENT: &str = "ack";

/// Identifier chosen by the client to pair an acknowledgment with its message
pub type AckId = u64;

/// Errors raised while decoding or encoding a frame
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One event on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckId>,
}

impl Frame {
    fn with_payload<T: Serialize>(event: &str, payload: &T, ack: Option<AckId>) -> Self {
        // Payload types below only hold strings and integers, which always serialize.
        let data = serde_json::to_value(payload).unwrap_or(Value::Null);
        Self {
            event: event.to_string(),
            data,
            ack,
        }
    }

    /// Client → server chat event, optionally requesting an acknowledgment
    pub fn chat(message: &ChatMessage, ack: Option<AckId>) -> Self {
        Self::with_payload(CHAT_EVENT, message, ack)
    }

    /// Server → client chat event
    pub fn broadcast(broadcast: &ChatBroadcast) -> Self {
        Self::with_payload(CHAT_EVENT, broadcast, None)
    }

    /// Server → client exception event
    pub fn exception(envelope: &ExceptionEnvelope) -> Self {
        Self::with_payload(EXCEPTION_EVENT, envelope, None)
    }

    /// Server → client acknowledgment for the message tagged with `id`
    pub fn ack(id: AckId, payload: &AckPayload) -> Self {
        Self::with_payload(ACK_EVENT, payload, Some(id))
    }

    pub fn from_json(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is(&self, event: &str) -> bool {
        self.event == event
    }
}

/// Inbound chat event payload (client → server)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub nickname: String,
    pub message: String,
}

/// Outbound chat event payload (server → clients)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    pub nickname: String,
    pub message: String,
    /// Unix timestamp (milliseconds since epoch) assigned by the server
    pub time: i64,
}

impl ChatBroadcast {
    pub fn from_message(message: ChatMessage, time: i64) -> Self {
        Self {
            nickname: message.nickname,
            message: message.message,
            time,
        }
    }
}

/// Fixed `status` value of an [`ExceptionEnvelope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionStatus {
    Error,
}

/// Error path payload, sent on the `exception` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEnvelope {
    pub status: ExceptionStatus,
    pub message: String,
}

impl ExceptionEnvelope {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ExceptionStatus::Error,
            message: message.into(),
        }
    }
}

/// Acknowledgment payload: `{}` on success, `{"error": "..."}` on failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckPayload {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
        }
    }
}
