//! Connection state and message log entries exposed to the UI.

use std::fmt;

/// Nickname of entries produced by the client itself (connection progress)
pub const SYSTEM_NICKNAME: &str = "system";
/// Nickname of the greeting shown once connected
pub const BOT_NICKNAME: &str = "bot";
/// Nickname of error entries
pub const ERROR_NICKNAME: &str = "error";
/// Default nickname of the local user
pub const USER_NICKNAME: &str = "user";

/// Lifecycle of the single logical connection to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Lost an established connection; the reason comes from the transport
    Disconnected(String),
    /// Never managed to connect
    Errored(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected(reason) => write!(f, "disconnected ({})", reason),
            ConnectionState::Errored(reason) => write!(f, "error ({})", reason),
        }
    }
}

/// One line of the conversation log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub text: String,
    /// Author, or one of the reserved nicknames for client-generated entries
    pub nickname: String,
    /// Unix timestamp (milliseconds since epoch)
    pub time: i64,
}

impl LogEntry {
    pub fn new(text: impl Into<String>, nickname: impl Into<String>, time: i64) -> Self {
        Self {
            text: text.into(),
            nickname: nickname.into(),
            time,
        }
    }
}
