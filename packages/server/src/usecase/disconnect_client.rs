//! UseCase: クライアント切断処理

use std::sync::Arc;

use crate::domain::{ConnectionId, ConnectionRegistry};

/// クライアント切断のユースケース
pub struct DisconnectClientUseCase {
    registry: Arc<dyn ConnectionRegistry>,
}

impl DisconnectClientUseCase {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 接続を登録解除する。既に解除済みの ID でもエラーにならない
    pub async fn execute(&self, id: &ConnectionId) {
        self.registry.unregister(id).await;
        tracing::info!(
            "Connection '{}' closed ({} remaining)",
            id,
            self.registry.count().await
        );
    }
}
