//! 値オブジェクト
//!
//! 識別子やメッセージ本文など、不変で値そのものが意味を持つ型を定義します。
//! 生成時にバリデーションを行い、不正な値がドメイン層に入り込まないようにします。

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValueObjectError;

/// アップロードセッション ID の最大長
pub const UPLOAD_SESSION_ID_MAX_LEN: usize = 128;

/// メッセージ本文の最大文字数
pub const MESSAGE_CONTENT_MAX_CHARS: usize = 10_000;

/// ユーザー ID（認証済みトークンの `sub` から得られる）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ルーム（チャット）ID
///
/// プレゼンスとファンアウトのスコープ単位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(i64);

impl RoomId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 接続 ID（トランスポート層が接続ごとに払い出す不透明な識別子）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// 新しい接続 ID を生成
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// アップロードセッション ID（クライアントが払い出すトークン）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UploadSessionId(String);

impl UploadSessionId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.trim().is_empty() {
            return Err(ValueObjectError::UploadSessionIdEmpty);
        }
        if value.len() > UPLOAD_SESSION_ID_MAX_LEN {
            return Err(ValueObjectError::UploadSessionIdTooLong(value.len()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UploadSessionId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UploadSessionId> for String {
    fn from(value: UploadSessionId) -> Self {
        value.0
    }
}

impl fmt::Display for UploadSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// メッセージ本文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.trim().is_empty() {
            return Err(ValueObjectError::MessageContentEmpty);
        }
        let chars = value.chars().count();
        if chars > MESSAGE_CONTENT_MAX_CHARS {
            return Err(ValueObjectError::MessageContentTooLong(chars));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for MessageContent {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// メッセージ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    /// ファイルメッセージ（マージ完了時にのみ生成される）
    File,
}

impl MessageKind {
    pub fn parse(value: &str) -> Result<Self, ValueObjectError> {
        match value {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "file" => Ok(MessageKind::File),
            other => Err(ValueObjectError::UnknownMessageKind(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
        }
    }
}

/// タイムスタンプ（Unix ミリ秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_session_id_rejects_empty() {
        // テスト項目: 空白のみのアップロードセッション ID は拒否される
        // given (前提条件):
        let value = "   ".to_string();

        // when (操作):
        let result = UploadSessionId::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::UploadSessionIdEmpty));
    }

    #[test]
    fn test_upload_session_id_rejects_too_long() {
        // テスト項目: 上限を超える長さのアップロードセッション ID は拒否される
        // given (前提条件):
        let value = "x".repeat(UPLOAD_SESSION_ID_MAX_LEN + 1);

        // when (操作):
        let result = UploadSessionId::new(value);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ValueObjectError::UploadSessionIdTooLong(
                UPLOAD_SESSION_ID_MAX_LEN + 1
            ))
        );
    }

    #[test]
    fn test_message_content_validation() {
        // テスト項目: メッセージ本文は空を拒否し、上限文字数ちょうどは許可する
        // given (前提条件):
        let at_limit = "あ".repeat(MESSAGE_CONTENT_MAX_CHARS);
        let over_limit = "a".repeat(MESSAGE_CONTENT_MAX_CHARS + 1);

        // when (操作):
        let empty = MessageContent::new(String::new());
        let ok = MessageContent::new(at_limit);
        let too_long = MessageContent::new(over_limit);

        // then (期待する結果):
        assert_eq!(empty, Err(ValueObjectError::MessageContentEmpty));
        assert!(ok.is_ok());
        assert_eq!(
            too_long,
            Err(ValueObjectError::MessageContentTooLong(
                MESSAGE_CONTENT_MAX_CHARS + 1
            ))
        );
    }

    #[test]
    fn test_message_kind_parse() {
        // テスト項目: 既知の種別は解釈でき、未知の種別はエラーになる
        // given (前提条件):

        // when (操作):
        let text = MessageKind::parse("text");
        let file = MessageKind::parse("file");
        let unknown = MessageKind::parse("video");

        // then (期待する結果):
        assert_eq!(text, Ok(MessageKind::Text));
        assert_eq!(file, Ok(MessageKind::File));
        assert_eq!(
            unknown,
            Err(ValueObjectError::UnknownMessageKind("video".to_string()))
        );
    }

    #[test]
    fn test_ids_serialize_transparently() {
        // テスト項目: ID 型は JSON 上で素の値としてシリアライズされる
        // given (前提条件):
        let room_id = RoomId::new(7);
        let session_id = UploadSessionId::new("abc".to_string()).unwrap();

        // when (操作):
        let room_json = serde_json::to_string(&room_id).unwrap();
        let session_json = serde_json::to_string(&session_id).unwrap();

        // then (期待する結果):
        assert_eq!(room_json, "7");
        assert_eq!(session_json, "\"abc\"");
    }
}
