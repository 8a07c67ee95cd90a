//! UseCase: Presence Coordinator
//!
//! 接続・切断・subscribe・unsubscribe を PresenceBook の変更に変換し、
//! オンライン状況が変化したルームの `RoomPresence` を返す。
//! 返された状況のブロードキャストは呼び出し側（Session Gateway）が行う。
//!
//! ## ロックの扱い
//!
//! 外部ストアへの問い合わせ（ルーム一覧、メンバー一覧）はロックの外で行い、
//! 結果は改めて取得した短いロックの中で適用する。適用前に接続がまだ
//! 生きているかを確認するので、問い合わせ中の切断で状態が壊れることはない。

use std::sync::Arc;

use tokio::sync::Mutex;

use hiroba_shared::time::Clock;

use crate::domain::{
    AuthVerifier, ChatMembershipStore, ConnectionId, MessagePusher, PresenceBook, PusherChannel,
    RoomId, RoomPresence, Timestamp, UserId,
};

use super::{
    authorization::is_member,
    error::{ConnectError, PresenceError},
};

/// subscribe の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOutcome {
    /// 既に join 済みだった（ブロードキャスト不要）
    pub already_subscribed: bool,
    pub presence: RoomPresence,
}

/// Presence Coordinator
pub struct PresenceCoordinator {
    book: Arc<Mutex<PresenceBook>>,
    /// トークン検証
    auth_verifier: Arc<dyn AuthVerifier>,
    /// ルーム一覧・メンバー一覧の取得元
    membership_store: Arc<dyn ChatMembershipStore>,
    /// 接続ごとの送信キューの管理
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl PresenceCoordinator {
    pub fn new(
        book: Arc<Mutex<PresenceBook>>,
        auth_verifier: Arc<dyn AuthVerifier>,
        membership_store: Arc<dyn ChatMembershipStore>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            book,
            auth_verifier,
            membership_store,
            message_pusher,
            clock,
        }
    }

    /// トークンを検証してユーザー ID を得る
    ///
    /// 失敗した接続は登録しない（トランスポート層で拒否する）。
    pub async fn authenticate(&self, token: &str) -> Result<UserId, ConnectError> {
        let user_id = self.auth_verifier.verify(token).await?;
        tracing::debug!("Token verified for user {}", user_id);
        Ok(user_id)
    }

    /// 接続を登録し、送信キューを紐付ける
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        sender: PusherChannel,
    ) -> Result<(), ConnectError> {
        let connected_at = Timestamp::new(self.clock.now_millis());
        {
            let mut book = self.book.lock().await;
            book.register(connection_id, user_id, connected_at)
                .inspect_err(|e| tracing::error!("Registry invariant violated: {}", e))?;
        }
        self.message_pusher.attach(connection_id, sender).await;
        tracing::info!("Connection {} registered for user {}", connection_id, user_id);
        Ok(())
    }

    /// ユーザーが所属する全ルームに接続を join させる
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<RoomPresence>)` - join 後の各ルームの状況（ブロードキャスト対象）
    /// * `Err(ConnectError::Cancelled)` - ルーム一覧の取得中に接続が切断された
    /// * `Err(ConnectError::Upstream)` - ルーム一覧の取得に失敗した
    pub async fn join_user_rooms(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
    ) -> Result<Vec<RoomPresence>, ConnectError> {
        let rooms = self
            .membership_store
            .list_rooms_for_user(user_id)
            .await
            .map_err(ConnectError::Upstream)?;

        let mut book = self.book.lock().await;
        if !book.is_live(&connection_id) {
            tracing::debug!(
                "Connection {} closed while its rooms were loading",
                connection_id
            );
            return Err(ConnectError::Cancelled);
        }
        let mut presences = Vec::with_capacity(rooms.len());
        for room_id in rooms {
            let outcome = book.join(&connection_id, room_id)?;
            presences.push(outcome.presence);
        }
        tracing::info!(
            "Connection {} auto-joined {} room(s)",
            connection_id,
            presences.len()
        );
        Ok(presences)
    }

    /// 切断処理（冪等）
    ///
    /// # Returns
    ///
    /// オンライン集合が変化したルームの新しい状況。未登録・切断済みなら空。
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Vec<RoomPresence> {
        let disconnected = {
            let mut book = self.book.lock().await;
            book.disconnect(&connection_id)
        };
        self.message_pusher.detach(&connection_id).await;

        match disconnected {
            Some(disconnected) => {
                tracing::info!(
                    "Connection {} of user {} disconnected ({} room(s) changed)",
                    connection_id,
                    disconnected.user_id,
                    disconnected.changed.len()
                );
                disconnected.changed
            }
            None => {
                tracing::debug!("Connection {} was already disconnected", connection_id);
                Vec::new()
            }
        }
    }

    /// 明示的な subscribe
    ///
    /// メンバーでなければ `Forbidden` を返し、状態は変更しない。
    pub async fn subscribe(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<SubscribeOutcome, PresenceError> {
        self.authorize(room_id, user_id).await?;

        let mut book = self.book.lock().await;
        let outcome = book
            .join(&connection_id, room_id)
            .inspect_err(|e| tracing::error!("Registry invariant violated: {}", e))?;
        Ok(SubscribeOutcome {
            already_subscribed: !outcome.newly_joined,
            presence: outcome.presence,
        })
    }

    /// 明示的な unsubscribe
    ///
    /// # Returns
    ///
    /// * `Ok(Some(presence))` - ユーザーがルームのオンライン集合から外れた
    /// * `Ok(None)` - 変化なし（未 join、または同じユーザーの別接続が残っている）
    pub async fn unsubscribe(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<Option<RoomPresence>, PresenceError> {
        self.authorize(room_id, user_id).await?;

        let mut book = self.book.lock().await;
        let changed = book
            .leave(&connection_id, room_id)
            .inspect_err(|e| tracing::error!("Registry invariant violated: {}", e))?;
        Ok(changed)
    }

    /// メンバーの生きている接続のうち、ルームに未 join のものを join させる
    ///
    /// 接続後に作られたルームでも、メッセージが最初に届いた時点でメンバーに配信されるようにする。
    /// 明示的に unsubscribe した接続は対象外。
    ///
    /// # Returns
    ///
    /// オンライン集合が変化した場合、ルームの新しい状況（ブロードキャスト対象）
    pub async fn admit_live_members(
        &self,
        room_id: RoomId,
        members: &[UserId],
    ) -> Option<RoomPresence> {
        let admitted = self.book.lock().await.admit_live_members(room_id, members);
        if let Some(presence) = &admitted {
            tracing::info!(
                "Auto-joined live members to room {} ({} online)",
                room_id,
                presence.online_count
            );
        }
        admitted
    }

    /// ユーザーが所属する全ルームのオンライン状況
    pub async fn online_statuses(&self, user_id: UserId) -> Result<Vec<RoomPresence>, PresenceError> {
        let rooms = self
            .membership_store
            .list_rooms_for_user(user_id)
            .await
            .map_err(PresenceError::Upstream)?;
        let book = self.book.lock().await;
        Ok(rooms.into_iter().map(|room_id| book.presence(room_id)).collect())
    }

    /// ルームの現在のオンライン状況
    pub async fn presence(&self, room_id: RoomId) -> RoomPresence {
        self.book.lock().await.presence(room_id)
    }

    /// 接続中の接続数
    pub async fn connection_count(&self) -> usize {
        self.book.lock().await.connection_count()
    }

    async fn authorize(&self, room_id: RoomId, user_id: UserId) -> Result<(), PresenceError> {
        let allowed = is_member(self.membership_store.as_ref(), room_id, user_id)
            .await
            .map_err(PresenceError::Upstream)?;
        if !allowed {
            tracing::warn!("User {} is not a member of room {}", user_id, room_id);
            return Err(PresenceError::Forbidden(room_id));
        }
        Ok(())
    }
}
