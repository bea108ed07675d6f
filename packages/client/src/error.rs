//! Error types for the chat client.

use thiserror::Error;

/// Why a message could not be handed to the transport
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The message was empty after trimming
    #[error("Message is empty")]
    EmptyMessage,

    /// The manager is not connected to the server
    #[error("Not connected to the chat server")]
    NotConnected,

    /// The transport task has stopped
    #[error("Connection manager is closed")]
    Closed,
}
