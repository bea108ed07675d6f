//! Code shared by the Hiroba relay server and its clients.
//!
//! - `protocol`: wire frames and event payloads
//! - `validation`: inbound chat message validation
//! - `time`: clock abstraction
//! - `logger`: tracing subscriber setup

pub mod logger;
pub mod protocol;
pub mod time;
pub mod validation;

pub use validation::{ValidationError, Violation};
