//! ドメイン層のエラー型

use thiserror::Error;

use super::value_object::{ConnectionId, UploadSessionId};

/// 値オブジェクト生成時のバリデーションエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueObjectError {
    #[error("upload session id must not be empty")]
    UploadSessionIdEmpty,

    #[error("upload session id is too long ({0} bytes)")]
    UploadSessionIdTooLong(usize),

    #[error("message content must not be empty")]
    MessageContentEmpty,

    #[error("message content is too long ({0} characters)")]
    MessageContentTooLong(usize),

    #[error("unknown message type '{0}'")]
    UnknownMessageKind(String),
}

/// Connection Registry の不変条件違反
///
/// 正常な実装では発生しないため、発生時はバグとして error ログを出す。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

/// チャンクアップロードのプロトコル違反
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("chunk index {index} is out of range for {total_chunks} total chunks")]
    InvalidChunk { index: u32, total_chunks: u32 },

    #[error("upload declared {expected} total chunks, got {actual}")]
    InconsistentUpload { expected: u32, actual: u32 },

    #[error("upload is missing chunks {missing:?}")]
    IncompleteUpload { missing: Vec<u32> },

    #[error("upload session '{0}' does not exist")]
    UnknownSession(UploadSessionId),

    #[error("upload session '{0}' belongs to another user")]
    NotOwner(UploadSessionId),
}

/// 認証エラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authentication token")]
    MissingToken,

    #[error("authentication token has expired")]
    Expired,

    #[error("invalid authentication token: {0}")]
    InvalidToken(String),
}

/// 外部ストアの呼び出し失敗
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// メッセージ送信（プッシュ）エラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessagePushError {
    #[error("connection {0} is not attached to the pusher")]
    ConnectionNotFound(ConnectionId),

    #[error("failed to push message: {0}")]
    PushFailed(String),
}
