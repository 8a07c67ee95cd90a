//! ドメイン層
//!
//! - `registry` / `membership` / `presence`: 接続とルームのオンライン状況
//! - `chunk_buffer`: 分割アップロードの再構成
//! - `port` / `message_pusher`: 外部コラボレータと配信手段のインターフェース

pub mod chunk_buffer;
pub mod entity;
pub mod error;
pub mod membership;
pub mod message_pusher;
pub mod port;
pub mod presence;
pub mod registry;
pub mod value_object;

pub use chunk_buffer::{AssembledUpload, ChunkReassemblyBuffer, ChunkReceipt};
pub use entity::{ChatMessage, Connection, FileRecord, NewFile, NewMessage, RoomPresence};
pub use error::{
    AuthError, MessagePushError, RegistryError, StoreError, UploadError, ValueObjectError,
};
pub use membership::RoomMembershipStore;
pub use message_pusher::{BroadcastReport, MessagePusher, PusherChannel};
#[cfg(test)]
pub use message_pusher::MockMessagePusher;
pub use port::{AuthVerifier, ChatMembershipStore, FileStore, MessageStore};
#[cfg(test)]
pub use port::{MockAuthVerifier, MockChatMembershipStore, MockFileStore, MockMessageStore};
pub use presence::{Disconnected, JoinOutcome, PresenceBook};
pub use registry::ConnectionRegistry;
pub use value_object::{
    ConnectionId, MessageContent, MessageKind, RoomId, Timestamp, UploadSessionId, UserId,
};
