//! Hiroba chat relay server.
//!
//! Accepts WebSocket connections, validates inbound chat events and relays
//! them to the connected clients.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
pub mod error;

pub use config::{DeliveryPolicy, ServerConfig};
pub use error::ServerError;
pub use ui::Server;
