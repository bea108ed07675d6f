//! Server configuration.

use std::time::Duration;

/// Who receives a validated chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DeliveryPolicy {
    /// Every registered connection, sender included
    #[default]
    Broadcast,
    /// Only the sending connection
    Echo,
    /// Every registered connection except the sender
    Others,
}

/// Runtime configuration of the relay server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub delivery_policy: DeliveryPolicy,
    /// Allowed CORS origin; `*` allows any origin
    pub cors_origin: String,
    /// Interval between server pings on each connection
    pub ping_interval: Duration,
    /// Extra silence tolerated after a ping before the connection is dropped
    pub ping_timeout: Duration,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// A connection that sends nothing for this long is closed
    pub fn idle_timeout(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3033,
            delivery_policy: DeliveryPolicy::default(),
            cors_origin: "*".to_string(),
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(5),
        }
    }
}
