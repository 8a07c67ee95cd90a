//! Server state shared by every handler.

use std::{sync::Arc, time::Duration};

use super::gateway::SessionGateway;

/// Per-connection timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// サーバーから ping を送る間隔
    pub ping_interval: Duration,
    /// 受信が途絶えてから接続を閉じるまでの時間
    pub ping_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Session Gateway（受信イベントの振り分けとセッション管理）
    pub gateway: Arc<SessionGateway>,
    pub settings: ConnectionSettings,
}
