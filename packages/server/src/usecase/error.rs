//! UseCase 層のエラー型
//!
//! Session Gateway がこれらをワイヤ上のエラーコードに変換する。

use thiserror::Error;

use crate::domain::{
    AuthError, RegistryError, RoomId, StoreError, UploadError, UserId, ValueObjectError,
};

/// 接続確立（認証・自動 join）のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to load rooms for user: {0}")]
    Upstream(StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// ルーム一覧の取得中に接続が切断された
    #[error("connection closed before its rooms were joined")]
    Cancelled,
}

/// subscribe / unsubscribe / オンライン状況取得のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PresenceError {
    #[error("user is not a member of room {0}")]
    Forbidden(RoomId),

    #[error("membership lookup failed: {0}")]
    Upstream(StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// メッセージ送信のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendMessageError {
    #[error("user is not a member of room {0}")]
    Forbidden(RoomId),

    #[error(transparent)]
    InvalidMessage(#[from] ValueObjectError),

    #[error("message store failed: {0}")]
    Upstream(StoreError),
}

/// チャンクアップロード・マージのエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileTransferError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("user is not a member of room {0}")]
    Forbidden(RoomId),

    #[error("chunk is {size} bytes, limit is {max}")]
    ChunkTooLarge { size: usize, max: usize },

    #[error("total chunks must be between 1 and {max}, got {total_chunks}")]
    TotalChunksOutOfRange { total_chunks: u32, max: u32 },

    #[error("uploads would buffer {buffered} bytes, limit is {max}")]
    BufferLimitExceeded { buffered: usize, max: usize },

    #[error(transparent)]
    InvalidFile(#[from] ValueObjectError),

    #[error("file or message store failed: {0}")]
    Upstream(StoreError),
}

/// 履歴取得のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("user is not a member of room {0}")]
    Forbidden(RoomId),

    #[error("message store failed: {0}")]
    Upstream(StoreError),
}

/// 通話シグナリング中継のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallRelayError {
    #[error("user {0} shares no room with the caller")]
    Forbidden(UserId),

    #[error("membership lookup failed: {0}")]
    Upstream(StoreError),
}
