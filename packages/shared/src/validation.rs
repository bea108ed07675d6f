//! Validation of chat event payloads.
//!
//! The server validates every inbound `chat` payload before relaying it. The
//! validator does not trim: a message made only of spaces is accepted.

use std::fmt;

use chrono::DateTime;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::{ChatBroadcast, ChatMessage};

/// A single rule broken by a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The payload is not a JSON object
    NotAnObject,
    /// A required field is absent (or `null`)
    Missing(&'static str),
    /// A field is present but is not a string
    NotAString(&'static str),
    /// A field is an empty string
    Empty(&'static str),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotAnObject => write!(f, "payload must be an object"),
            Violation::Missing(field) => write!(f, "{} is required", field),
            Violation::NotAString(field) => write!(f, "{} must be a string", field),
            Violation::Empty(field) => write!(f, "{} should not be empty", field),
        }
    }
}

/// Rejection of a chat payload, listing every violated rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// Human-readable reason sent back to the client
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn required_string<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
    violations: &mut Vec<Violation>,
) -> Option<&'a str> {
    match object.get(field) {
        None | Some(Value::Null) => {
            violations.push(Violation::Missing(field));
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            violations.push(Violation::Empty(field));
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            violations.push(Violation::NotAString(field));
            None
        }
    }
}

/// Validate a raw inbound `chat` payload.
///
/// Both `nickname` and `message` must be present, be strings and be
/// non-empty. Extra fields are ignored.
///
/// # Errors
///
/// Returns a [`ValidationError`] holding one violation per offending field.
pub fn validate_chat_message(payload: &Value) -> Result<ChatMessage, ValidationError> {
    let Some(object) = payload.as_object() else {
        return Err(ValidationError::new(vec![Violation::NotAnObject]));
    };

    let mut violations = Vec::new();
    let nickname = required_string(object, "nickname", &mut violations);
    let message = required_string(object, "message", &mut violations);

    match (nickname, message) {
        (Some(nickname), Some(message)) => Ok(ChatMessage {
            nickname: nickname.to_string(),
            message: message.to_string(),
        }),
        _ => Err(ValidationError::new(violations)),
    }
}

/// Shape check for a `chat` payload received by a client.
///
/// Looser than [`validate_chat_message`]: `nickname` and `message` only need
/// to be strings. `time` may be epoch milliseconds (integer or float) or an
/// RFC 3339 string; anything else is replaced with `fallback_time`.
pub fn validate_broadcast(payload: &Value, fallback_time: i64) -> Option<ChatBroadcast> {
    let object = payload.as_object()?;
    let nickname = object.get("nickname")?.as_str()?;
    let message = object.get("message")?.as_str()?;
    let time = object
        .get("time")
        .and_then(parse_time)
        .unwrap_or(fallback_time);

    Some(ChatBroadcast {
        nickname: nickname.to_string(),
        message: message.to_string(),
        time,
    })
}

fn parse_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|millis| millis.is_finite())
                .map(|millis| millis.trunc() as i64)
        }),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|time| time.timestamp_millis()),
        _ => None,
    }
}
