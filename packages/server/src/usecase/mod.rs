//! UseCase 層
//!
//! ドメイン層の構造体とポートを組み合わせてアプリケーションの操作を実装する。
//! ワイヤ形式への変換は行わず、配信フレームは呼び出し側から受け取る。

mod authorization;
pub mod call_relay;
pub mod error;
pub mod fanout;
pub mod file_transfer;
pub mod get_chat_history;
pub mod presence;
pub mod send_message;

pub use call_relay::CallRelayUseCase;
pub use error::{
    CallRelayError, ConnectError, FileTransferError, HistoryError, PresenceError,
    SendMessageError,
};
pub use fanout::FanoutDispatcher;
pub use file_transfer::{FileTransferUseCase, MergeRequest, MergedFile, UploadLimits};
pub use get_chat_history::{DEFAULT_HISTORY_LIMIT, GetChatHistoryUseCase};
pub use presence::{PresenceCoordinator, SubscribeOutcome};
pub use send_message::SendMessageUseCase;
