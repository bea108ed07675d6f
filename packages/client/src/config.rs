//! Client configuration.

use std::time::Duration;

use crate::state::USER_NICKNAME;

/// Runtime configuration of a [`ConnectionManager`](crate::ConnectionManager)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay server
    pub url: String,
    /// Nickname attached to outgoing messages
    pub nickname: String,
    /// Delay between reconnection attempts
    pub reconnect_interval: Duration,
    /// Give up after this many consecutive failed attempts (`None` retries forever)
    pub max_reconnect_attempts: Option<u32>,
    /// Sent messages without an acknowledgment after this long are reported as failed
    pub ack_timeout: Duration,
    /// Keep only the most recent entries in the message log (`None` keeps everything)
    pub log_capacity: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3033/ws".to_string(),
            nickname: USER_NICKNAME.to_string(),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_attempts: None,
            ack_timeout: Duration::from_secs(10),
            log_capacity: None,
        }
    }
}
