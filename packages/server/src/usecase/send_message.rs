//! UseCase: メッセージ送信処理
//!
//! 認可 → 永続化 → メンバーの自動 join → ファンアウト の順に処理する。
//! 永続化に成功したメッセージだけが配信され、配信の一部失敗は送信の失敗にはならない。
//!
//! 自動 join により、接続後に作られたルームでもオンラインのメンバーにメッセージが届く。
//! オンライン集合が変わった場合は、メッセージより先にオンライン状況を配信する。

use std::sync::Arc;

use crate::domain::{
    ChatMembershipStore, ChatMessage, ConnectionId, MessageContent, MessageKind, MessageStore,
    NewMessage, RoomId, RoomPresence, UserId,
};

use super::{error::SendMessageError, fanout::FanoutDispatcher, presence::PresenceCoordinator};

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    membership_store: Arc<dyn ChatMembershipStore>,
    message_store: Arc<dyn MessageStore>,
    presence: Arc<PresenceCoordinator>,
    fanout: Arc<FanoutDispatcher>,
}

impl SendMessageUseCase {
    pub fn new(
        membership_store: Arc<dyn ChatMembershipStore>,
        message_store: Arc<dyn MessageStore>,
        presence: Arc<PresenceCoordinator>,
        fanout: Arc<FanoutDispatcher>,
    ) -> Self {
        Self {
            membership_store,
            message_store,
            presence,
            fanout,
        }
    }

    /// メッセージ送信を実行
    ///
    /// # Arguments
    ///
    /// * `sender` - 送信元の接続（配信対象から除外する）
    /// * `encode` - 永続化済みメッセージを配信フレームに変換する関数（DTO 層が提供）
    /// * `encode_presence` - オンライン状況を配信フレームに変換する関数
    ///
    /// # Returns
    ///
    /// * `Ok(ChatMessage)` - 永続化済みメッセージ（送信者への ack に使う）
    /// * `Err(SendMessageError)` - 認可・永続化の失敗。この場合は何も配信されず、自動 join も行わない
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<F, P>(
        &self,
        sender: ConnectionId,
        user_id: UserId,
        room_id: RoomId,
        kind: MessageKind,
        content: MessageContent,
        encode: F,
        encode_presence: P,
    ) -> Result<ChatMessage, SendMessageError>
    where
        F: FnOnce(&ChatMessage) -> String + Send,
        P: Fn(&RoomPresence) -> String + Send + Sync,
    {
        let members = self
            .membership_store
            .list_members(room_id)
            .await
            .map_err(SendMessageError::Upstream)?;
        if !members.contains(&user_id) {
            tracing::warn!("User {} tried to send to room {}", user_id, room_id);
            return Err(SendMessageError::Forbidden(room_id));
        }

        let message = self
            .message_store
            .create_message(NewMessage {
                room_id,
                sender_id: user_id,
                kind,
                content,
                file_id: None,
            })
            .await
            .map_err(|e| {
                tracing::error!("Failed to persist message for room {}: {}", room_id, e);
                SendMessageError::Upstream(e)
            })?;

        if self
            .presence
            .admit_live_members(room_id, &members)
            .await
            .is_some()
        {
            self.fanout.deliver_presence(&[room_id], encode_presence).await;
        }

        let payload = encode(&message);
        self.fanout.deliver(room_id, &payload, Some(sender)).await;
        tracing::info!(
            "Message {} from user {} sent to room {}",
            message.id,
            user_id,
            room_id
        );

        Ok(message)
    }
}
