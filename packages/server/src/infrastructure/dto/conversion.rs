//! Conversion logic from domain entities to DTOs.

use hiroba_shared::time::timestamp_to_rfc3339;

use crate::domain::entity;
use crate::infrastructure::dto::websocket as dto;

impl From<&entity::ChatMessage> for dto::MessageDto {
    fn from(model: &entity::ChatMessage) -> Self {
        Self {
            id: model.id,
            room_id: model.room_id.value(),
            sender_id: model.sender_id.value(),
            kind: model.kind,
            content: model.content.clone(),
            file_id: model.file_id,
            created_at: timestamp_to_rfc3339(model.created_at.value()),
        }
    }
}

impl From<&entity::RoomPresence> for dto::OnlineStatusDto {
    fn from(model: &entity::RoomPresence) -> Self {
        Self {
            room_id: model.room_id.value(),
            online_users: model.online_users.iter().map(|u| u.value()).collect(),
            online_count: model.online_count,
        }
    }
}

impl From<&entity::FileRecord> for dto::FileDto {
    fn from(model: &entity::FileRecord) -> Self {
        Self {
            id: model.id,
            filename: model.filename.clone(),
            mimetype: model.mimetype.clone(),
            size: model.size,
            uploader_id: model.uploader_id.value(),
            path: model.path.clone(),
            created_at: timestamp_to_rfc3339(model.created_at.value()),
        }
    }
}

/// `newMessage` frame for a persisted message
pub fn new_message_frame(message: &entity::ChatMessage) -> String {
    dto::OutboundFrame::NewMessage(message.into()).to_json()
}

/// `online_status` frame for a room snapshot
pub fn online_status_frame(presence: &entity::RoomPresence) -> String {
    dto::OutboundFrame::OnlineStatus(presence.into()).to_json()
}
