//! 外部ストアの実装
//!
//! - `inmemory`: チャット・メンバー・メッセージのインメモリ実装（開発・テスト用）
//! - `file`: ローカルディスクへのファイル保存

pub mod file;
pub mod inmemory;

pub use file::{LocalFileStore, PUBLIC_UPLOAD_PREFIX};
pub use inmemory::{InMemoryChatStore, SeedData, SeedError, SeedRoom};
