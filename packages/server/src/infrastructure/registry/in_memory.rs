//! In-memory connection registry backed by mpsc channels.
//!
//! Register, unregister and snapshot-then-send run under one mutex, which is
//! what gives broadcasts their "as of send time" recipient set.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use hiroba_shared::time::Clock;
use tokio::sync::Mutex;

use crate::domain::{
    ConnectionHandle, ConnectionId, ConnectionRecord, ConnectionRegistry, RegistryError,
};

struct ConnectionEntry {
    handle: ConnectionHandle,
    record: ConnectionRecord,
}

/// Connection registry keeping live handles in memory
///
/// ```ignore
/// let registry = InMemoryConnectionRegistry::new(Arc::new(SystemClock));
/// let record = registry.register(tx).await;
/// registry.emit_to(&record.id, "{\"event\":\"chat\"}").await?;
/// ```
pub struct InMemoryConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryConnectionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn push(id: &ConnectionId, entry: &ConnectionEntry, content: &str) -> bool {
        match entry.handle.send(content.to_string()) {
            Ok(()) => {
                tracing::debug!("Pushed frame to connection '{}'", id);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to push frame to connection '{}': {}", id, e);
                false
            }
        }
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn register(&self, handle: ConnectionHandle) -> ConnectionRecord {
        let mut connections = self.connections.lock().await;

        let mut id = ConnectionId::generate();
        while connections.contains_key(&id) {
            id = ConnectionId::generate();
        }
        let record = ConnectionRecord {
            id: id.clone(),
            joined_at: self.clock.now_millis(),
        };
        connections.insert(
            id.clone(),
            ConnectionEntry {
                handle,
                record: record.clone(),
            },
        );
        tracing::debug!(
            "Connection '{}' registered ({} active)",
            id,
            connections.len()
        );

        record
    }

    async fn unregister(&self, id: &ConnectionId) {
        let mut connections = self.connections.lock().await;
        if connections.remove(id).is_some() {
            tracing::debug!(
                "Connection '{}' unregistered ({} active)",
                id,
                connections.len()
            );
        }
    }

    async fn broadcast_all(&self, content: &str) -> Vec<ConnectionId> {
        let connections = self.connections.lock().await;
        connections
            .iter()
            .filter(|(id, entry)| Self::push(id, entry, content))
            .map(|(id, _)| id.clone())
            .collect()
    }

    async fn broadcast_except(&self, exclude: &ConnectionId, content: &str) -> Vec<ConnectionId> {
        let connections = self.connections.lock().await;
        connections
            .iter()
            .filter(|(id, _)| *id != exclude)
            .filter(|(id, entry)| Self::push(id, entry, content))
            .map(|(id, _)| id.clone())
            .collect()
    }

    async fn emit_to(&self, id: &ConnectionId, content: &str) -> Result<(), RegistryError> {
        let connections = self.connections.lock().await;
        let entry = connections
            .get(id)
            .ok_or_else(|| RegistryError::ConnectionNotFound(id.to_string()))?;

        entry
            .handle
            .send(content.to_string())
            .map_err(|e| RegistryError::PushFailed(e.to_string()))?;
        tracing::debug!("Pushed frame to connection '{}'", id);

        Ok(())
    }

    async fn connections(&self) -> Vec<ConnectionRecord> {
        let connections = self.connections.lock().await;
        let mut records: Vec<ConnectionRecord> =
            connections.values().map(|entry| entry.record.clone()).collect();
        records.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    async fn count(&self) -> usize {
        self.connections.lock().await.len()
    }
}
