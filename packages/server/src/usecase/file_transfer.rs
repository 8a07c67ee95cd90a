//! UseCase: チャンク分割ファイル転送
//!
//! - `upload_chunk`: チャンクを Chunk Reassembly Buffer に格納する（セッション ID で識別、ルーム非依存）
//! - `merge`: ルームの認可 → 連結 → ファイル保存 → ファイルメッセージの永続化 → ファンアウト
//! - `sweep_idle`: 放棄されたアップロードセッションを回収する
//!
//! マージは認可に成功してからバッファを消費する。ファイル保存に失敗した場合、
//! チャンクは既に解放済みなのでクライアントは再アップロードする必要がある。
//! ファイル保存後にメッセージの永続化に失敗した場合は、保存したファイルを削除する。

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;

use hiroba_shared::time::Clock;

use crate::domain::{
    ChatMembershipStore, ChatMessage, ChunkReassemblyBuffer, ChunkReceipt, ConnectionId,
    FileRecord, FileStore, MessageContent, MessageKind, MessageStore, NewFile, NewMessage, RoomId,
    Timestamp, UploadError, UploadSessionId, UserId,
};

use super::{authorization::is_member, error::FileTransferError, fanout::FanoutDispatcher};

/// アップロードの上限値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_chunk_bytes: usize,
    pub max_total_chunks: u32,
    /// 1 ユーザーが未マージのまま保持できる合計バイト数（全セッション合算）
    pub max_buffered_bytes_per_user: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 5 * 1024 * 1024,
            max_total_chunks: 10_000,
            max_buffered_bytes_per_user: 256 * 1024 * 1024,
        }
    }
}

/// マージ要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub session_id: UploadSessionId,
    pub room_id: RoomId,
    pub filename: String,
    pub mimetype: String,
    /// クライアントが申告したサイズ（実際のサイズと異なれば警告のみ）
    pub declared_size: Option<u64>,
}

/// マージ結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFile {
    pub file: FileRecord,
    pub message: ChatMessage,
}

pub struct FileTransferUseCase {
    buffer: Mutex<ChunkReassemblyBuffer>,
    membership_store: Arc<dyn ChatMembershipStore>,
    file_store: Arc<dyn FileStore>,
    message_store: Arc<dyn MessageStore>,
    fanout: Arc<FanoutDispatcher>,
    clock: Arc<dyn Clock>,
    limits: UploadLimits,
}

impl FileTransferUseCase {
    pub fn new(
        membership_store: Arc<dyn ChatMembershipStore>,
        file_store: Arc<dyn FileStore>,
        message_store: Arc<dyn MessageStore>,
        fanout: Arc<FanoutDispatcher>,
        clock: Arc<dyn Clock>,
        limits: UploadLimits,
    ) -> Self {
        Self {
            buffer: Mutex::new(ChunkReassemblyBuffer::new()),
            membership_store,
            file_store,
            message_store,
            fanout,
            clock,
            limits,
        }
    }

    /// チャンクを受信する
    pub async fn upload_chunk(
        &self,
        user_id: UserId,
        session_id: &UploadSessionId,
        index: u32,
        total_chunks: u32,
        bytes: Vec<u8>,
    ) -> Result<ChunkReceipt, FileTransferError> {
        if total_chunks == 0 || total_chunks > self.limits.max_total_chunks {
            return Err(FileTransferError::TotalChunksOutOfRange {
                total_chunks,
                max: self.limits.max_total_chunks,
            });
        }
        if bytes.len() > self.limits.max_chunk_bytes {
            return Err(FileTransferError::ChunkTooLarge {
                size: bytes.len(),
                max: self.limits.max_chunk_bytes,
            });
        }

        let now = Timestamp::new(self.clock.now_millis());
        let receipt = {
            let mut buffer = self.buffer.lock().await;
            // 同じインデックスの再送は差し替えになるので、増分だけを数える
            let replaced = buffer.chunk_len(session_id, index).unwrap_or(0);
            let buffered = buffer
                .buffered_bytes_for(&user_id)
                .saturating_sub(replaced)
                + bytes.len();
            if buffered > self.limits.max_buffered_bytes_per_user {
                tracing::warn!(
                    "User {} would buffer {} bytes across uploads (limit {})",
                    user_id,
                    buffered,
                    self.limits.max_buffered_bytes_per_user
                );
                return Err(FileTransferError::BufferLimitExceeded {
                    buffered,
                    max: self.limits.max_buffered_bytes_per_user,
                });
            }
            buffer.put_chunk(session_id, user_id, index, bytes, total_chunks, now)
        }
        .inspect_err(|e| tracing::warn!("Rejected chunk for upload '{}': {}", session_id, e))?;

        tracing::debug!(
            "Upload '{}': chunk {} stored ({}/{})",
            session_id,
            index,
            receipt.received_chunks,
            receipt.total_chunks
        );
        Ok(receipt)
    }

    /// チャンクを連結してファイルとして保存し、ファイルメッセージを配信する
    pub async fn merge<F>(
        &self,
        sender: ConnectionId,
        user_id: UserId,
        request: MergeRequest,
        encode: F,
    ) -> Result<MergedFile, FileTransferError>
    where
        F: FnOnce(&ChatMessage) -> String + Send,
    {
        let MergeRequest {
            session_id,
            room_id,
            filename,
            mimetype,
            declared_size,
        } = request;

        // バッファを消費する前に検証する
        let content = MessageContent::new(filename.clone())?;
        let allowed = is_member(self.membership_store.as_ref(), room_id, user_id)
            .await
            .map_err(FileTransferError::Upstream)?;
        if !allowed {
            tracing::warn!("User {} tried to upload into room {}", user_id, room_id);
            return Err(FileTransferError::Forbidden(room_id));
        }

        let assembled = {
            let mut buffer = self.buffer.lock().await;
            buffer.merge(&session_id, user_id)
        }
        .inspect_err(|e| tracing::warn!("Cannot merge upload '{}': {}", session_id, e))?;

        let new_file = NewFile {
            filename,
            mimetype,
            uploader_id: user_id,
            bytes: assembled.bytes,
        };
        if let Some(declared) = declared_size.filter(|size| *size != new_file.size()) {
            tracing::warn!(
                "Upload '{}' declared {} bytes but assembled {} bytes",
                session_id,
                declared,
                new_file.size()
            );
        }

        let file = self.file_store.create_file_record(new_file).await.map_err(|e| {
            tracing::error!("Failed to store file for upload '{}': {}", session_id, e);
            FileTransferError::Upstream(e)
        })?;

        let message = match self
            .message_store
            .create_message(NewMessage {
                room_id,
                sender_id: user_id,
                kind: MessageKind::File,
                content,
                file_id: Some(file.id),
            })
            .await
        {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Failed to persist file message for room {}: {}", room_id, e);
                self.remove_unreferenced_file(&file).await;
                return Err(FileTransferError::Upstream(e));
            }
        };

        let payload = encode(&message);
        self.fanout.deliver(room_id, &payload, Some(sender)).await;
        tracing::info!(
            "Upload '{}' merged into file {} ({} bytes) in room {}",
            session_id,
            file.id,
            file.size,
            room_id
        );

        Ok(MergedFile { file, message })
    }

    /// メッセージから参照されなくなったファイルを削除する
    async fn remove_unreferenced_file(&self, file: &FileRecord) {
        match self.file_store.delete_file_record(file.id).await {
            Ok(_) => tracing::warn!(
                "Removed file {} ({}) because its message was not stored",
                file.id,
                file.path
            ),
            Err(e) => tracing::error!(
                "File {} ({}) is orphaned: no message references it and removal failed: {}",
                file.id,
                file.path,
                e
            ),
        }
    }

    /// アップロードを中止し、受信済みチャンクを破棄する（冪等）
    ///
    /// 他のユーザーのセッションは破棄できない。
    pub async fn discard(
        &self,
        user_id: UserId,
        session_id: &UploadSessionId,
    ) -> Result<bool, FileTransferError> {
        let mut buffer = self.buffer.lock().await;
        match buffer.owner_of(session_id) {
            Some(owner) if owner != user_id => {
                Err(UploadError::NotOwner(session_id.clone()).into())
            }
            _ => Ok(buffer.cleanup(session_id)),
        }
    }

    /// 最終アクティビティから `idle_timeout` 以上経過したセッションを回収する
    pub async fn sweep_idle(&self, idle_timeout: Duration) -> Vec<UploadSessionId> {
        let now = Timestamp::new(self.clock.now_millis());
        let idle_millis = i64::try_from(idle_timeout.as_millis()).unwrap_or(i64::MAX);
        let swept = self.buffer.lock().await.sweep_idle(now, idle_millis);
        if !swept.is_empty() {
            tracing::info!("Reclaimed {} idle upload session(s)", swept.len());
        }
        swept
    }

    /// 保持中のアップロードセッション数と合計バイト数
    pub async fn buffer_usage(&self) -> (usize, usize) {
        let buffer = self.buffer.lock().await;
        (buffer.session_count(), buffer.buffered_bytes())
    }
}
