//! UseCase: チャット履歴取得

use std::sync::Arc;

use crate::domain::{ChatMembershipStore, ChatMessage, MessageStore, RoomId, UserId};

use super::{authorization::is_member, error::HistoryError};

/// 履歴の既定件数
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

pub struct GetChatHistoryUseCase {
    membership_store: Arc<dyn ChatMembershipStore>,
    message_store: Arc<dyn MessageStore>,
    limit: usize,
}

impl GetChatHistoryUseCase {
    pub fn new(
        membership_store: Arc<dyn ChatMembershipStore>,
        message_store: Arc<dyn MessageStore>,
        limit: usize,
    ) -> Self {
        Self {
            membership_store,
            message_store,
            limit,
        }
    }

    /// 直近のメッセージを新しい順に返す
    pub async fn execute(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let allowed = is_member(self.membership_store.as_ref(), room_id, user_id)
            .await
            .map_err(HistoryError::Upstream)?;
        if !allowed {
            return Err(HistoryError::Forbidden(room_id));
        }
        self.message_store
            .list_recent(room_id, self.limit)
            .await
            .map_err(HistoryError::Upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MessageContent, MessageKind, NewMessage},
        infrastructure::store::InMemoryChatStore,
    };

    const ROOM: RoomId = RoomId::new(7);
    const ALICE: UserId = UserId::new(1);

    async fn post(store: &InMemoryChatStore, text: &str) {
        store
            .create_message(NewMessage {
                room_id: ROOM,
                sender_id: ALICE,
                kind: MessageKind::Text,
                content: MessageContent::new(text.to_string()).unwrap(),
                file_id: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        // テスト項目: 直近 limit 件が新しい順に返される
        // given (前提条件):
        let store = Arc::new(InMemoryChatStore::with_rooms([(ROOM, vec![ALICE])]));
        for text in ["one", "two", "three"] {
            post(&store, text).await;
        }
        let usecase = GetChatHistoryUseCase::new(store.clone(), store.clone(), 2);

        // when (操作):
        let history = usecase.execute(ALICE, ROOM).await.unwrap();

        // then (期待する結果):
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "two"]);
    }

    #[tokio::test]
    async fn test_history_forbidden_for_non_member() {
        // テスト項目: メンバーでないユーザーは履歴を取得できない
        // given (前提条件):
        let store = Arc::new(InMemoryChatStore::with_rooms([(ROOM, vec![ALICE])]));
        let usecase = GetChatHistoryUseCase::new(store.clone(), store, DEFAULT_HISTORY_LIMIT);

        // when (操作):
        let result = usecase.execute(UserId::new(2), ROOM).await;

        // then (期待する結果):
        assert_eq!(result, Err(HistoryError::Forbidden(ROOM)));
    }
}
