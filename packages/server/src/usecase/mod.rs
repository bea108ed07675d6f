//! UseCase layer: connection lifecycle and chat relay.

pub mod connect_client;
pub mod disconnect_client;
pub mod relay_chat;

pub use connect_client::ConnectClientUseCase;
pub use disconnect_client::DisconnectClientUseCase;
pub use relay_chat::{RelayChatUseCase, RelayOutcome};
