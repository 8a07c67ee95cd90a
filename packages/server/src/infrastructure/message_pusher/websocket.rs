//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続ごとの送信キュー（`PusherChannel`）を `ConnectionId` で管理
//! - フレームをキューに積む（push_to, broadcast）
//!
//! キューから取り出してソケットに書き込むのは UI 層の pusher ループ。
//! キューは unbounded なので、遅い受信者がブロードキャスト全体を止めることはない。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{BroadcastReport, ConnectionId, MessagePushError, MessagePusher, PusherChannel};

#[derive(Default)]
pub struct WebSocketMessagePusher {
    /// 接続中の送信キュー
    channels: Arc<Mutex<HashMap<ConnectionId, PusherChannel>>>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登録中の送信キュー数
    pub async fn attached_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn attach(&self, connection_id: ConnectionId, sender: PusherChannel) {
        let mut channels = self.channels.lock().await;
        channels.insert(connection_id, sender);
        tracing::debug!("Connection {} attached to MessagePusher", connection_id);
    }

    async fn detach(&self, connection_id: &ConnectionId) {
        let mut channels = self.channels.lock().await;
        if channels.remove(connection_id).is_some() {
            tracing::debug!("Connection {} detached from MessagePusher", connection_id);
        }
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError> {
        let channels = self.channels.lock().await;
        let sender = channels
            .get(connection_id)
            .ok_or(MessagePushError::ConnectionNotFound(*connection_id))?;
        sender
            .send(content.to_string())
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))
    }

    async fn broadcast(&self, targets: &[ConnectionId], content: &str) -> BroadcastReport {
        let channels = self.channels.lock().await;
        let mut report = BroadcastReport::default();

        for target in targets {
            match channels.get(target) {
                Some(sender) if sender.send(content.to_string()).is_ok() => {
                    report.delivered += 1;
                }
                Some(_) => {
                    tracing::warn!("Send queue of connection {} is closed", target);
                    report.failed.push(*target);
                }
                None => {
                    tracing::warn!("Connection {} not attached during broadcast, skipping", target);
                    report.failed.push(*target);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_push_to_success() {
        // テスト項目: 特定の接続にフレームを送信できる
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::generate();
        pusher.attach(conn, tx).await;

        // when (操作):
        let result = pusher.push_to(&conn, "Hello").await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(rx.recv().await, Some("Hello".to_string()));
    }

    #[tokio::test]
    async fn test_push_to_unknown_connection() {
        // テスト項目: 未登録の接続への送信は ConnectionNotFound
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let conn = ConnectionId::generate();

        // when (操作):
        let result = pusher.push_to(&conn, "Hello").await;

        // then (期待する結果):
        assert_eq!(result, Err(MessagePushError::ConnectionNotFound(conn)));
    }

    #[tokio::test]
    async fn test_broadcast_partial_failure() {
        // テスト項目: 一部の接続が存在しなくても他の接続には届き、失敗分が報告される
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alive = ConnectionId::generate();
        let gone = ConnectionId::generate();
        pusher.attach(alive, tx).await;

        // when (操作):
        let report = pusher.broadcast(&[alive, gone], "Broadcast").await;

        // then (期待する結果):
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![gone]);
        assert_eq!(rx.recv().await, Some("Broadcast".to_string()));
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        // テスト項目: 登録解除は何度呼んでもよく、以後の送信は失敗する
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::generate();
        pusher.attach(conn, tx).await;

        // when (操作):
        pusher.detach(&conn).await;
        pusher.detach(&conn).await;

        // then (期待する結果):
        assert_eq!(pusher.attached_count().await, 0);
        assert!(pusher.push_to(&conn, "late").await.is_err());
    }
}
