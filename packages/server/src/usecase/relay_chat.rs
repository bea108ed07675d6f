//! UseCase: チャットメッセージの中継処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RelayChatUseCase::execute() / reject() メソッド
//! - 検証・タイムスタンプ付与・配信ポリシーに従った配信・ack 送信
//!
//! ### なぜこのテストが必要か
//! - 不正なメッセージは送信者にだけ exception として返り、配信されないことを保証
//! - 配信ポリシー（broadcast / echo / others）ごとの宛先を保証
//! - time が単調非減少であることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：検証を通過したメッセージの配信（ack あり / なし）
//! - 異常系：nickname / message の欠落・空文字列、フレームとして読めないテキスト
//! - エッジケース：時計の巻き戻り

use std::sync::Arc;

use hiroba_shared::{
    protocol::{AckId, AckPayload, ChatBroadcast, ExceptionEnvelope, Frame},
    time::Clock,
    validation::validate_chat_message,
};
use serde_json::Value;

use crate::{
    config::DeliveryPolicy,
    domain::{ConnectionId, ConnectionRegistry},
};

/// Result of relaying one inbound chat event
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// The message was validated and handed to the recipients
    Delivered {
        broadcast: ChatBroadcast,
        recipients: Vec<ConnectionId>,
    },
    /// The message was rejected; the sender was notified on `exception`
    Rejected { reason: String },
}

/// チャット中継のユースケース
pub struct RelayChatUseCase {
    registry: Arc<dyn ConnectionRegistry>,
    clock: Arc<dyn Clock>,
    policy: DeliveryPolicy,
}

impl RelayChatUseCase {
    /// 新しい RelayChatUseCase を作成
    ///
    /// `clock` は単調非減少な時刻を返すもの（`MonotonicClock`）を渡すこと
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        clock: Arc<dyn Clock>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            registry,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// chat イベントの中継を実行
    ///
    /// # Arguments
    ///
    /// * `from` - 送信元の接続 ID
    /// * `payload` - 検証前の chat ペイロード
    /// * `ack` - クライアントが ack を要求した場合の ID
    pub async fn execute(
        &self,
        from: &ConnectionId,
        payload: &Value,
        ack: Option<AckId>,
    ) -> RelayOutcome {
        // 1. 検証
        let message = match validate_chat_message(payload) {
            Ok(message) => message,
            Err(e) => return self.reject(from, e.reason(), ack).await,
        };

        // 2. サーバー時刻を付与
        let broadcast = ChatBroadcast::from_message(message, self.clock.now_millis());

        // 3. 配信ポリシーに従って配信
        let recipients = match Frame::broadcast(&broadcast).to_json() {
            Ok(json) => self.deliver(from, &json).await,
            Err(e) => {
                tracing::error!("Failed to serialize chat broadcast: {}", e);
                Vec::new()
            }
        };
        tracing::info!(
            "Relayed message from '{}' ({}) to {} connection(s)",
            broadcast.nickname,
            from,
            recipients.len()
        );

        // 4. ack
        if let Some(id) = ack {
            self.emit(from, &Frame::ack(id, &AckPayload::ok())).await;
        }

        RelayOutcome::Delivered {
            broadcast,
            recipients,
        }
    }

    /// 送信者にだけ exception（と要求されていれば ack エラー）を返す
    ///
    /// 接続は切断しない
    pub async fn reject(
        &self,
        from: &ConnectionId,
        reason: String,
        ack: Option<AckId>,
    ) -> RelayOutcome {
        tracing::warn!("Rejected message from '{}': {}", from, reason);

        self.emit(from, &Frame::exception(&ExceptionEnvelope::error(reason.clone())))
            .await;
        if let Some(id) = ack {
            self.emit(from, &Frame::ack(id, &AckPayload::failed(reason.clone())))
                .await;
        }

        RelayOutcome::Rejected { reason }
    }

    async fn deliver(&self, from: &ConnectionId, json: &str) -> Vec<ConnectionId> {
        match self.policy {
            DeliveryPolicy::Broadcast => self.registry.broadcast_all(json).await,
            DeliveryPolicy::Others => self.registry.broadcast_except(from, json).await,
            DeliveryPolicy::Echo => match self.registry.emit_to(from, json).await {
                Ok(()) => vec![from.clone()],
                Err(e) => {
                    tracing::warn!("Failed to echo message to '{}': {}", from, e);
                    Vec::new()
                }
            },
        }
    }

    async fn emit(&self, to: &ConnectionId, frame: &Frame) {
        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize '{}' frame: {}", frame.event, e);
                return;
            }
        };
        if let Err(e) = self.registry.emit_to(to, &json).await {
            tracing::warn!("Failed to emit '{}' to '{}': {}", frame.event, to, e);
        }
    }
}
