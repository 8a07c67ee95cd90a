//! エンティティ
//!
//! `Connection` はこのプロセス内で生成・破棄される一時的なエンティティ。
//! `ChatMessage` / `FileRecord` は外部ストアが所有する永続レコードで、
//! コアはルーティングに使う `room_id` 以外を不透明な値として扱う。

use std::collections::BTreeSet;

use serde::Serialize;

use super::value_object::{ConnectionId, MessageContent, MessageKind, RoomId, Timestamp, UserId};

/// 1 本のトランスポート接続
///
/// Connection Registry のみが所有し、他のコンポーネントは `ConnectionId` 経由で参照する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    /// 認証時に一度だけ設定される
    pub user_id: UserId,
    /// 現在 join しているルーム
    pub rooms: BTreeSet<RoomId>,
    /// 明示的に leave したルーム（メッセージ送信時の自動 join から除外する）
    pub left_rooms: BTreeSet<RoomId>,
    pub connected_at: Timestamp,
}

impl Connection {
    pub fn new(id: ConnectionId, user_id: UserId, connected_at: Timestamp) -> Self {
        Self {
            id,
            user_id,
            rooms: BTreeSet::new(),
            left_rooms: BTreeSet::new(),
            connected_at,
        }
    }

    pub fn is_in_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains(room_id)
    }

    pub fn has_left(&self, room_id: &RoomId) -> bool {
        self.left_rooms.contains(room_id)
    }
}

/// 永続化済みメッセージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: String,
    pub file_id: Option<i64>,
    pub created_at: Timestamp,
}

/// 永続化前のメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: MessageContent,
    pub file_id: Option<i64>,
}

/// 永続化済みファイルのメタデータ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    /// クライアントが申告した元のファイル名
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
    pub uploader_id: UserId,
    /// 公開パス（例: `/uploads/<uuid>.png`）
    pub path: String,
    pub created_at: Timestamp,
}

/// 永続化前のファイル（マージ済みバイト列を含む）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub filename: String,
    pub mimetype: String,
    pub uploader_id: UserId,
    pub bytes: Vec<u8>,
}

impl NewFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// あるルームのオンライン状況のスナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomPresence {
    pub room_id: RoomId,
    /// ユーザー ID 昇順
    pub online_users: Vec<UserId>,
    pub online_count: usize,
}

impl RoomPresence {
    pub fn new(room_id: RoomId, online_users: Vec<UserId>) -> Self {
        let online_count = online_users.len();
        Self {
            room_id,
            online_users,
            online_count,
        }
    }
}
