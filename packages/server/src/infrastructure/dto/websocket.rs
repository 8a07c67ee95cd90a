//! WebSocket frame DTOs.
//!
//! Inbound frames are decoded in two steps: first the envelope
//! (`{"event", "data", "requestId"}`), then the event-specific payload, so that
//! a malformed payload can still be answered with the caller's `requestId`.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::domain::MessageKind;

// ========================================
// Inbound
// ========================================

/// Envelope of every client → server frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[serde(alias = "chatId")]
    pub room_id: i64,
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    #[serde(alias = "chatId")]
    pub room_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkPayload {
    pub session_id: String,
    #[serde(alias = "chunkIndex")]
    pub index: u32,
    pub total_chunks: u32,
    /// Standard base64
    #[serde(alias = "chunk")]
    pub bytes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeChunksPayload {
    pub session_id: String,
    pub filename: String,
    #[serde(default = "default_mimetype")]
    pub mimetype: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(alias = "chatId")]
    pub room_id: i64,
}

fn default_mimetype() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub session_id: String,
}

/// WebRTC signalling payloads. The signal bodies are opaque to the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOfferPayload {
    pub to: i64,
    pub offer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswerPayload {
    pub to: i64,
    pub answer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidatePayload {
    pub to: i64,
    pub candidate: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTargetPayload {
    pub to: i64,
}

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SendMessage(SendMessagePayload),
    SubscribeToChat(RoomPayload),
    UnsubscribeFromChat(RoomPayload),
    UploadChunk(UploadChunkPayload),
    MergeChunks(MergeChunksPayload),
    CancelUpload(SessionPayload),
    GetChatHistory(RoomPayload),
    GetOnlineStatus,
    CallUser(CallOfferPayload),
    AnswerCall(CallAnswerPayload),
    IceCandidate(IceCandidatePayload),
    EndCall(CallTargetPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(String),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("invalid payload for '{event}': {reason}")]
    InvalidPayload { event: String, reason: String },
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    /// Decode the event-specific payload
    pub fn decode(&self) -> Result<InboundEvent, DecodeError> {
        let event = match self.event.as_str() {
            "sendMessage" => InboundEvent::SendMessage(self.payload()?),
            "subscribeToChat" => InboundEvent::SubscribeToChat(self.payload()?),
            "unsubscribeFromChat" => InboundEvent::UnsubscribeFromChat(self.payload()?),
            "uploadChunk" => InboundEvent::UploadChunk(self.payload()?),
            "mergeChunks" => InboundEvent::MergeChunks(self.payload()?),
            "cancelUpload" => InboundEvent::CancelUpload(self.payload()?),
            "getChatHistory" => InboundEvent::GetChatHistory(self.payload()?),
            "getOnlineStatus" => InboundEvent::GetOnlineStatus,
            "callUser" => InboundEvent::CallUser(self.payload()?),
            "answerCall" => InboundEvent::AnswerCall(self.payload()?),
            "iceCandidate" => InboundEvent::IceCandidate(self.payload()?),
            "endCall" => InboundEvent::EndCall(self.payload()?),
            other => return Err(DecodeError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }

    fn payload<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_value(self.data.clone()).map_err(|e| DecodeError::InvalidPayload {
            event: self.event.clone(),
            reason: e.to_string(),
        })
    }
}

// ========================================
// Outbound
// ========================================

/// Server → client frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundFrame {
    #[serde(rename = "newMessage")]
    NewMessage(MessageDto),
    #[serde(rename = "online_status")]
    OnlineStatus(OnlineStatusDto),
    #[serde(rename = "ack")]
    Ack(AckDto),
    #[serde(rename = "error")]
    Error(ErrorDto),
    #[serde(rename = "incomingCall")]
    IncomingCall(CallSignalDto),
    #[serde(rename = "callAnswered")]
    CallAnswered(CallSignalDto),
    #[serde(rename = "iceCandidate")]
    IceCandidate(CallSignalDto),
    #[serde(rename = "callEnded")]
    CallEnded(CallSignalDto),
}

impl OutboundFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize outbound frame: {}", e);
            r#"{"event":"error","data":{"code":"INTERNAL","message":"serialization failed","retryable":false}}"#
                .to_string()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub file_id: Option<i64>,
    /// RFC 3339
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatusDto {
    pub room_id: i64,
    pub online_users: Vec<i64>,
    pub online_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDto {
    pub id: i64,
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
    pub uploader_id: i64,
    pub path: String,
    pub created_at: String,
}

/// Relayed call signal, tagged with the sender
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSignalDto {
    pub from: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<serde_json::Value>,
}

impl CallSignalDto {
    pub fn from_user(from: i64) -> Self {
        Self {
            from,
            offer: None,
            answer: None,
            candidate: None,
        }
    }
}

/// Acknowledgement of one inbound event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckDto {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub result: AckResult,
}

/// Event-specific ack body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AckResult {
    #[serde(rename_all = "camelCase")]
    Subscribed {
        already_subscribed: bool,
        #[serde(flatten)]
        status: OnlineStatusDto,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribed { room_id: i64 },
    #[serde(rename_all = "camelCase")]
    ChunkStored {
        session_id: String,
        chunk_index: u32,
        received_chunks: u32,
        total_chunks: u32,
    },
    #[serde(rename_all = "camelCase")]
    MessageSent { message: MessageDto },
    #[serde(rename_all = "camelCase")]
    FileMerged { message: MessageDto, file: FileDto },
    #[serde(rename_all = "camelCase")]
    UploadCancelled { session_id: String, discarded: bool },
    #[serde(rename_all = "camelCase")]
    History {
        room_id: i64,
        messages: Vec<MessageDto>,
    },
    #[serde(rename_all = "camelCase")]
    OnlineStatuses { statuses: Vec<OnlineStatusDto> },
    #[serde(rename_all = "camelCase")]
    SignalRelayed { to: i64, delivered: usize },
}

/// Stable machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    BadRequest,
    InconsistentUpload,
    IncompleteUpload,
    UpstreamFailure,
    Internal,
}

impl ErrorCode {
    /// Whether the same request may succeed if retried unchanged
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorCode::UpstreamFailure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_chunks: Option<Vec<u32>>,
}

impl ErrorDto {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            event: None,
            request_id: None,
            code,
            message: message.into(),
            retryable: code.retryable(),
            missing_chunks: None,
        }
    }
}
