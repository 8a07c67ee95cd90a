//! Chunk Reassembly Buffer
//!
//! アップロードセッションごとに受信済みチャンクをインデックスで保持し、
//! マージ時にインデックス昇順で 1 本のバイト列に連結する。
//!
//! ## 状態遷移
//!
//! ```text
//! Empty ──put_chunk──▶ Receiving ──merge──▶ (連結して破棄)
//!                          │
//!                          └──cleanup / sweep_idle──▶ Abandoned (破棄)
//! ```
//!
//! - `total_chunks` は最初のチャンクで確定し、以降の不一致は `InconsistentUpload`
//! - 同じインデックスの再送は上書き（後勝ち）
//! - チャンクの到着順は保存にもマージ結果にも影響しない

use std::collections::HashMap;

use super::{
    error::UploadError,
    value_object::{Timestamp, UploadSessionId, UserId},
};

/// 1 アップロード分の受信状態
#[derive(Debug, Clone)]
struct UploadSession {
    owner: UserId,
    total_chunks: u32,
    chunks: HashMap<u32, Vec<u8>>,
    buffered_bytes: usize,
    last_activity: Timestamp,
}

impl UploadSession {
    fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|index| !self.chunks.contains_key(index))
            .collect()
    }
}

/// チャンク受信結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub chunk_index: u32,
    pub received_chunks: u32,
    pub total_chunks: u32,
}

impl ChunkReceipt {
    /// 全チャンクが揃ったか
    pub fn is_complete(&self) -> bool {
        self.received_chunks == self.total_chunks
    }
}

/// マージ済みアップロード
///
/// バイト列は呼び出し側に引き渡され、バッファには残らない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledUpload {
    pub session_id: UploadSessionId,
    pub owner: UserId,
    pub total_chunks: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ChunkReassemblyBuffer {
    sessions: HashMap<UploadSessionId, UploadSession>,
}

impl ChunkReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// チャンクを格納する
    ///
    /// 最初の呼び出しでセッションを作成し、`owner` と `total_chunks` を記録する。
    /// エラー時はセッションの状態を一切変更しない。
    pub fn put_chunk(
        &mut self,
        session_id: &UploadSessionId,
        owner: UserId,
        index: u32,
        bytes: Vec<u8>,
        total_chunks: u32,
        now: Timestamp,
    ) -> Result<ChunkReceipt, UploadError> {
        if index >= total_chunks {
            return Err(UploadError::InvalidChunk {
                index,
                total_chunks,
            });
        }

        let session = match self.sessions.get_mut(session_id) {
            Some(session) => {
                if session.owner != owner {
                    return Err(UploadError::NotOwner(session_id.clone()));
                }
                if session.total_chunks != total_chunks {
                    return Err(UploadError::InconsistentUpload {
                        expected: session.total_chunks,
                        actual: total_chunks,
                    });
                }
                session
            }
            None => self
                .sessions
                .entry(session_id.clone())
                .or_insert_with(|| UploadSession {
                    owner,
                    total_chunks,
                    chunks: HashMap::new(),
                    buffered_bytes: 0,
                    last_activity: now,
                }),
        };

        session.buffered_bytes += bytes.len();
        if let Some(previous) = session.chunks.insert(index, bytes) {
            session.buffered_bytes -= previous.len();
        }
        session.last_activity = now;

        Ok(ChunkReceipt {
            chunk_index: index,
            received_chunks: session.chunks.len() as u32,
            total_chunks: session.total_chunks,
        })
    }

    /// 全チャンクをインデックス昇順に連結し、セッションを破棄する
    ///
    /// 欠けているチャンクがあれば `IncompleteUpload`（欠番一覧付き）を返し、
    /// セッションはそのまま残す。
    pub fn merge(
        &mut self,
        session_id: &UploadSessionId,
        requester: UserId,
    ) -> Result<AssembledUpload, UploadError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| UploadError::UnknownSession(session_id.clone()))?;
        if session.owner != requester {
            return Err(UploadError::NotOwner(session_id.clone()));
        }
        let missing = session.missing();
        if !missing.is_empty() {
            return Err(UploadError::IncompleteUpload { missing });
        }

        let Some(mut session) = self.sessions.remove(session_id) else {
            return Err(UploadError::UnknownSession(session_id.clone()));
        };
        let mut bytes = Vec::with_capacity(session.buffered_bytes);
        for index in 0..session.total_chunks {
            if let Some(chunk) = session.chunks.remove(&index) {
                bytes.extend_from_slice(&chunk);
            }
        }

        Ok(AssembledUpload {
            session_id: session_id.clone(),
            owner: session.owner,
            total_chunks: session.total_chunks,
            bytes,
        })
    }

    /// セッションを状態に関係なく破棄する（冪等）。破棄した場合 `true`。
    pub fn cleanup(&mut self, session_id: &UploadSessionId) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// 最終アクティビティから `idle_timeout_millis` 以上経過したセッションを破棄する
    pub fn sweep_idle(&mut self, now: Timestamp, idle_timeout_millis: i64) -> Vec<UploadSessionId> {
        let expired: Vec<UploadSessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.value() - s.last_activity.value() >= idle_timeout_millis)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
        }
        expired
    }

    /// 欠けているチャンクのインデックス（セッションがなければ `None`）
    pub fn missing_chunks(&self, session_id: &UploadSessionId) -> Option<Vec<u32>> {
        self.sessions.get(session_id).map(UploadSession::missing)
    }

    pub fn owner_of(&self, session_id: &UploadSessionId) -> Option<UserId> {
        self.sessions.get(session_id).map(|s| s.owner)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// 全セッション合計の保持バイト数
    pub fn buffered_bytes(&self) -> usize {
        self.sessions.values().map(|s| s.buffered_bytes).sum()
    }

    /// `owner` のセッション合計の保持バイト数
    pub fn buffered_bytes_for(&self, owner: &UserId) -> usize {
        self.sessions
            .values()
            .filter(|s| s.owner == *owner)
            .map(|s| s.buffered_bytes)
            .sum()
    }

    /// 格納済みチャンクのサイズ（未受信なら `None`）
    pub fn chunk_len(&self, session_id: &UploadSessionId, index: u32) -> Option<usize> {
        self.sessions
            .get(session_id)
            .and_then(|s| s.chunks.get(&index))
            .map(Vec::len)
    }
}
