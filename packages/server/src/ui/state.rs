//! Server state shared by the handlers.

use std::{sync::Arc, time::Duration};

use crate::{
    domain::ConnectionRegistry,
    usecase::{ConnectClientUseCase, DisconnectClientUseCase, RelayChatUseCase},
};

/// Shared application state
pub struct AppState {
    /// ConnectionRegistry（接続管理の抽象化）
    pub registry: Arc<dyn ConnectionRegistry>,
    pub connect_client_usecase: Arc<ConnectClientUseCase>,
    pub disconnect_client_usecase: Arc<DisconnectClientUseCase>,
    pub relay_chat_usecase: Arc<RelayChatUseCase>,
    /// Interval between server pings
    pub ping_interval: Duration,
    /// Connections silent for longer than this are closed
    pub idle_timeout: Duration,
}
