//! InMemory チャットストア実装
//!
//! ドメイン層が定義する `ChatMembershipStore` と `MessageStore` の具体的な実装。
//! 本番ではチャット・メッセージを所有する外部サービスに置き換わる想定で、
//! ここではルームとメンバーの対応表、ルームごとのメッセージログを保持するだけ。
//!
//! ルームとメンバーは JSON の seed ファイルから読み込める:
//!
//! ```json
//! { "rooms": [ { "id": 7, "members": [1, 2] } ] }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::Arc,
};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use hiroba_shared::time::{Clock, SystemClock};

use crate::domain::{
    ChatMembershipStore, ChatMessage, MessageStore, NewMessage, RoomId, StoreError, Timestamp,
    UserId,
};

/// seed ファイルの内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub rooms: Vec<SeedRoom>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedRoom {
    pub id: RoomId,
    #[serde(default)]
    pub members: Vec<UserId>,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug)]
struct ChatState {
    members: BTreeMap<RoomId, BTreeSet<UserId>>,
    /// ルームごとのメッセージ（古い順）
    messages: BTreeMap<RoomId, Vec<ChatMessage>>,
    next_message_id: i64,
}

impl ChatState {
    fn new() -> Self {
        Self {
            members: BTreeMap::new(),
            messages: BTreeMap::new(),
            next_message_id: 1,
        }
    }
}

pub struct InMemoryChatStore {
    state: Mutex<ChatState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(ChatState::new()),
            clock,
        }
    }

    /// ルームとメンバーを指定して作成する
    pub fn with_rooms<I>(rooms: I) -> Self
    where
        I: IntoIterator<Item = (RoomId, Vec<UserId>)>,
    {
        let mut state = ChatState::new();
        for (room_id, members) in rooms {
            state.members.entry(room_id).or_default().extend(members);
        }
        Self {
            state: Mutex::new(state),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_seed(seed: SeedData) -> Self {
        Self::with_rooms(seed.rooms.into_iter().map(|room| (room.id, room.members)))
    }

    /// JSON の seed ファイルから作成する
    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let seed: SeedData = serde_json::from_str(&raw)?;
        tracing::info!(
            "Loaded {} room(s) from seed file {}",
            seed.rooms.len(),
            path.as_ref().display()
        );
        Ok(Self::from_seed(seed))
    }

    /// ルームにメンバーを追加する
    pub async fn add_member(&self, room_id: RoomId, user_id: UserId) {
        let mut state = self.state.lock().await;
        state.members.entry(room_id).or_default().insert(user_id);
    }

    /// 登録済みルーム数
    pub async fn room_count(&self) -> usize {
        self.state.lock().await.members.len()
    }
}

impl Default for InMemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatMembershipStore for InMemoryChatStore {
    async fn list_rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .iter()
            .filter(|(_, members)| members.contains(&user_id))
            .map(|(room_id, _)| *room_id)
            .collect())
    }

    async fn list_members(&self, room_id: RoomId) -> Result<Vec<UserId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .get(&room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl MessageStore for InMemoryChatStore {
    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let created_at = Timestamp::new(self.clock.now_millis());
        let mut state = self.state.lock().await;
        if !state.members.contains_key(&message.room_id) {
            return Err(StoreError::NotFound(format!("room {}", message.room_id)));
        }

        let id = state.next_message_id;
        state.next_message_id += 1;
        let stored = ChatMessage {
            id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            kind: message.kind,
            content: message.content.into_string(),
            file_id: message.file_id,
            created_at,
        };
        state
            .messages
            .entry(stored.room_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .get(&room_id)
            .map(|messages| messages.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageContent, MessageKind};
    use hiroba_shared::time::FixedClock;
    use std::io::Write;

    fn new_message(room_id: RoomId, text: &str) -> NewMessage {
        NewMessage {
            room_id,
            sender_id: UserId::new(1),
            kind: MessageKind::Text,
            content: MessageContent::new(text.to_string()).unwrap(),
            file_id: None,
        }
    }

    #[tokio::test]
    async fn test_rooms_and_members_lookup() {
        // テスト項目: ユーザーの所属ルームとルームのメンバーが昇順で返される
        // given (前提条件):
        let store = InMemoryChatStore::with_rooms([
            (RoomId::new(8), vec![UserId::new(2), UserId::new(1)]),
            (RoomId::new(7), vec![UserId::new(1)]),
        ]);

        // when (操作):
        let rooms = store.list_rooms_for_user(UserId::new(1)).await.unwrap();
        let members = store.list_members(RoomId::new(8)).await.unwrap();
        let unknown = store.list_members(RoomId::new(404)).await.unwrap();

        // then (期待する結果):
        assert_eq!(rooms, vec![RoomId::new(7), RoomId::new(8)]);
        assert_eq!(members, vec![UserId::new(1), UserId::new(2)]);
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn test_create_message_assigns_id_and_time() {
        // テスト項目: 永続化されたメッセージに連番 ID と作成時刻が付与される
        // given (前提条件):
        let store = InMemoryChatStore::with_clock(Arc::new(FixedClock::new(1_700_000_000_000)));
        store.add_member(RoomId::new(7), UserId::new(1)).await;

        // when (操作):
        let first = store
            .create_message(new_message(RoomId::new(7), "a"))
            .await
            .unwrap();
        let second = store
            .create_message(new_message(RoomId::new(7), "b"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(first.created_at, Timestamp::new(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_create_message_in_unknown_room() {
        // テスト項目: 存在しないルームへのメッセージは NotFound
        // given (前提条件):
        let store = InMemoryChatStore::new();

        // when (操作):
        let result = store.create_message(new_message(RoomId::new(404), "a")).await;

        // then (期待する結果):
        assert_eq!(result, Err(StoreError::NotFound("room 404".to_string())));
    }

    #[tokio::test]
    async fn test_from_seed_file() {
        // テスト項目: JSON の seed ファイルからルームとメンバーを読み込める
        // given (前提条件):
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"rooms":[{{"id":7,"members":[1,2]}},{{"id":9}}]}}"#
        )
        .unwrap();

        // when (操作):
        let store = InMemoryChatStore::from_seed_file(file.path()).await.unwrap();

        // then (期待する結果):
        assert_eq!(store.room_count().await, 2);
        assert_eq!(
            store.list_members(RoomId::new(7)).await.unwrap(),
            vec![UserId::new(1), UserId::new(2)]
        );
    }

    #[tokio::test]
    async fn test_from_seed_file_rejects_invalid_json() {
        // テスト項目: 壊れた seed ファイルは Parse エラーになる
        // given (前提条件):
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        // when (操作):
        let result = InMemoryChatStore::from_seed_file(file.path()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(SeedError::Parse(_))));
    }
}
