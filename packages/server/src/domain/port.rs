//! 外部コラボレータのインターフェース
//!
//! トークン検証、チャット・メンバー情報、メッセージ永続化、ファイル保存は
//! コアの外側にある。ドメイン層はここで trait を定義し、
//! Infrastructure 層が実装を提供する（依存性の逆転）。
//!
//! どの呼び出しも失敗・遅延しうる。UseCase 層は Presence ロックを保持したまま
//! これらを await してはならない。

use async_trait::async_trait;

use super::{
    entity::{ChatMessage, FileRecord, NewFile, NewMessage},
    error::{AuthError, StoreError},
    value_object::{RoomId, UserId},
};

/// 認証トークンの検証
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// トークンを検証し、ユーザー ID を返す
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

/// チャットとメンバーの情報源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatMembershipStore: Send + Sync {
    /// ユーザーが所属するチャット（ルーム）一覧
    async fn list_rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomId>, StoreError>;

    /// ルームのメンバー一覧（購読・送信の認可に使う）
    async fn list_members(&self, room_id: RoomId) -> Result<Vec<UserId>, StoreError>;
}

/// メッセージの永続化
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    /// 新しい順に最大 `limit` 件
    async fn list_recent(&self, room_id: RoomId, limit: usize)
    -> Result<Vec<ChatMessage>, StoreError>;
}

/// ファイルの永続化
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// バイト列を保存し、メタデータレコードを作成する
    async fn create_file_record(&self, file: NewFile) -> Result<FileRecord, StoreError>;

    /// レコードと保存済みのバイト列を削除する。存在しなければ `Ok(false)`。
    async fn delete_file_record(&self, id: i64) -> Result<bool, StoreError>;
}
