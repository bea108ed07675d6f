//! UseCase: クライアント接続処理

use std::sync::Arc;

use crate::domain::{ConnectionHandle, ConnectionRecord, ConnectionRegistry};

/// クライアント接続のユースケース
pub struct ConnectClientUseCase {
    /// ConnectionRegistry（接続管理の抽象化）
    registry: Arc<dyn ConnectionRegistry>,
}

impl ConnectClientUseCase {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 接続を登録し、払い出された ConnectionRecord を返す
    ///
    /// # Arguments
    ///
    /// * `handle` - クライアントへのフレーム送信用チャンネル
    /// * `nickname` - クライアントが名乗ったニックネーム（ログ出力のみに使用）
    pub async fn execute(
        &self,
        handle: ConnectionHandle,
        nickname: Option<&str>,
    ) -> ConnectionRecord {
        let record = self.registry.register(handle).await;
        tracing::info!(
            "Connection '{}' opened (nickname: {})",
            record.id,
            nickname.unwrap_or("-")
        );
        record
    }
}
