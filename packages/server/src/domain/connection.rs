//! Connection value objects.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Channel feeding serialized frames to one live WebSocket connection
pub type ConnectionHandle = mpsc::UnboundedSender<String>;

/// Opaque identifier of one live connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry entry for an active connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    /// Unix timestamp when the connection registered (milliseconds)
    pub joined_at: i64,
}
