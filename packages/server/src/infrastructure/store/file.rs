//! ローカルディスクへのファイル保存
//!
//! マージ済みのバイト列を `<upload_dir>/<uuid><ext>` に書き込み、
//! 公開パス `/uploads/<uuid><ext>` を持つレコードを返す。
//! 元のファイル名は拡張子以外ディスク上のパスに使わない。

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use hiroba_shared::time::{Clock, SystemClock};

use crate::domain::{FileRecord, FileStore, NewFile, StoreError, Timestamp};

/// 公開パスの接頭辞
pub const PUBLIC_UPLOAD_PREFIX: &str = "/uploads";

/// ディスク上のファイル名に引き継ぐ拡張子の最大長
const MAX_EXTENSION_LEN: usize = 16;

pub struct LocalFileStore {
    upload_dir: PathBuf,
    records: Mutex<HashMap<i64, FileRecord>>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl LocalFileStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(upload_dir, Arc::new(SystemClock))
    }

    pub fn with_clock(upload_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            records: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            clock,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub async fn get(&self, id: i64) -> Option<FileRecord> {
        self.records.lock().await.get(&id).cloned()
    }

    /// 公開パスに対応するディスク上のパス
    fn disk_path(&self, public_path: &str) -> Option<PathBuf> {
        public_path
            .strip_prefix(PUBLIC_UPLOAD_PREFIX)
            .map(|name| self.upload_dir.join(name.trim_start_matches('/')))
    }
}

/// 元のファイル名から安全な拡張子（`.png` など）を取り出す
fn stored_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn create_file_record(&self, file: NewFile) -> Result<FileRecord, StoreError> {
        let stored_name = format!("{}{}", Uuid::new_v4(), stored_extension(&file.filename));
        let disk_path = self.upload_dir.join(&stored_name);

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| StoreError::Unavailable(format!("cannot create upload dir: {}", e)))?;
        tokio::fs::write(&disk_path, &file.bytes)
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("cannot write {}: {}", disk_path.display(), e))
            })?;

        let size = file.size();
        let created_at = Timestamp::new(self.clock.now_millis());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = FileRecord {
            id,
            filename: file.filename,
            mimetype: file.mimetype,
            size,
            uploader_id: file.uploader_id,
            path: format!("{}/{}", PUBLIC_UPLOAD_PREFIX, stored_name),
            created_at,
        };
        self.records.lock().await.insert(id, record.clone());
        tracing::debug!("Stored file {} at {}", id, disk_path.display());

        Ok(record)
    }

    async fn delete_file_record(&self, id: i64) -> Result<bool, StoreError> {
        let Some(record) = self.records.lock().await.remove(&id) else {
            return Ok(false);
        };
        if let Some(disk_path) = self.disk_path(&record.path) {
            match tokio::fs::remove_file(&disk_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StoreError::Unavailable(format!(
                        "cannot remove {}: {}",
                        disk_path.display(),
                        e
                    )));
                }
            }
        }
        tracing::debug!("Deleted file {}", id);
        Ok(true)
    }
}
