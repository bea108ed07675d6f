//! Domain errors.

use thiserror::Error;

/// Errors raised when pushing a frame to a single connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No live connection is registered under the id
    #[error("Connection '{0}' not found")]
    ConnectionNotFound(String),

    /// The connection is registered but its channel is closed
    #[error("Failed to push to connection: {0}")]
    PushFailed(String),
}
