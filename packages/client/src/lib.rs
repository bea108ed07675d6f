//! Hiroba chat client.
//!
//! [`ConnectionManager`] is the single point of contact between a UI and the
//! relay server: it keeps one logical connection alive across network
//! interruptions, buffers the conversation log and offers `send_message`.

pub mod config;
pub mod domain;
pub mod error;
pub mod formatter;
pub mod manager;
mod runner;
pub mod session;
pub mod state;
pub mod ui;

pub use config::ClientConfig;
pub use error::ClientError;
pub use manager::{ConnectionManager, Subscription};
pub use session::{ChatSession, SessionEvent};
pub use state::{ConnectionState, LogEntry};
