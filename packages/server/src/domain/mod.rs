//! Domain layer: connection identity and the registry abstraction.

pub mod connection;
pub mod error;
pub mod registry;

pub use connection::{ConnectionHandle, ConnectionId, ConnectionRecord};
pub use error::RegistryError;
pub use registry::ConnectionRegistry;
#[cfg(test)]
pub use registry::MockConnectionRegistry;
