//! メッセージ送信（通知）の抽象化
//!
//! 接続ごとの送信キューへシリアライズ済みフレームを積む。
//! 実際のソケットへの書き込みは UI 層の pusher ループが行うため、
//! ここでの送信は遅い受信者に引きずられない。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{error::MessagePushError, value_object::ConnectionId};

/// 接続ごとの送信キュー
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// ブロードキャスト結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// キューに積めなかった接続（切断処理中など）
    pub failed: Vec<ConnectionId>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// 接続の送信キューを登録する
    async fn attach(&self, connection_id: ConnectionId, sender: PusherChannel);

    /// 接続の送信キューを登録解除する（冪等）
    async fn detach(&self, connection_id: &ConnectionId);

    /// 特定の接続にフレームを送る
    async fn push_to(&self, connection_id: &ConnectionId, content: &str)
    -> Result<(), MessagePushError>;

    /// 複数の接続にフレームを送る
    ///
    /// 一部の接続への送信失敗は他の接続への配信を妨げない。
    async fn broadcast(&self, targets: &[ConnectionId], content: &str) -> BroadcastReport;
}
