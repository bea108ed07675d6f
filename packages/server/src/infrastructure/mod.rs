//! Infrastructure layer: concrete implementations of domain traits.

pub mod registry;

pub use registry::InMemoryConnectionRegistry;
