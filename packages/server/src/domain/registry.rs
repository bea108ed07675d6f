//! Connection registry trait.
//!
//! The registry is the only shared mutable resource of the relay. The use
//! case layer depends on this trait; the infrastructure layer provides the
//! implementation.

use async_trait::async_trait;

use super::{ConnectionHandle, ConnectionId, ConnectionRecord, RegistryError};

/// Tracks live connections and emits serialized frames to them.
///
/// Every registered id maps to exactly one live handle. Broadcasts deliver
/// to the connections registered when the call takes the registry lock;
/// connections registering afterwards do not receive that frame.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Register a new connection and return its record
    async fn register(&self, handle: ConnectionHandle) -> ConnectionRecord;

    /// Remove a connection. Unknown ids are ignored.
    async fn unregister(&self, id: &ConnectionId);

    /// Push `content` to every registered connection and return the recipients
    async fn broadcast_all(&self, content: &str) -> Vec<ConnectionId>;

    /// Push `content` to every registered connection except `exclude`
    async fn broadcast_except(&self, exclude: &ConnectionId, content: &str) -> Vec<ConnectionId>;

    /// Push `content` to a single connection
    async fn emit_to(&self, id: &ConnectionId, content: &str) -> Result<(), RegistryError>;

    /// Records of every registered connection, oldest first
    async fn connections(&self) -> Vec<ConnectionRecord>;

    /// Number of registered connections
    async fn count(&self) -> usize;
}
