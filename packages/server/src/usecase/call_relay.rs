//! UseCase: 通話シグナリングの中継
//!
//! WebRTC のオファー・アンサー・ICE 候補・終了通知を、宛先ユーザーの全接続へそのまま転送する。
//! シグナルの中身は解釈しない。宛先は送信者と 1 つ以上のルームを共有するユーザーに限る。

use std::sync::Arc;

use crate::domain::{ChatMembershipStore, UserId};

use super::{error::CallRelayError, fanout::FanoutDispatcher};

pub struct CallRelayUseCase {
    membership_store: Arc<dyn ChatMembershipStore>,
    fanout: Arc<FanoutDispatcher>,
}

impl CallRelayUseCase {
    pub fn new(membership_store: Arc<dyn ChatMembershipStore>, fanout: Arc<FanoutDispatcher>) -> Self {
        Self {
            membership_store,
            fanout,
        }
    }

    /// シグナルを宛先ユーザーの全接続に転送する
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - 届いた接続数（宛先がオフラインなら 0）
    /// * `Err(CallRelayError::Forbidden)` - 宛先と共有しているルームがない
    pub async fn relay(
        &self,
        from: UserId,
        to: UserId,
        payload: &str,
    ) -> Result<usize, CallRelayError> {
        if !self.shares_room(from, to).await? {
            tracing::warn!("User {} tried to signal user {} outside their rooms", from, to);
            return Err(CallRelayError::Forbidden(to));
        }

        let report = self.fanout.deliver_to_user(to, payload).await;
        tracing::debug!(
            "Relayed call signal from user {} to {} connection(s) of user {}",
            from,
            report.delivered,
            to
        );
        Ok(report.delivered)
    }

    async fn shares_room(&self, from: UserId, to: UserId) -> Result<bool, CallRelayError> {
        let caller_rooms = self
            .membership_store
            .list_rooms_for_user(from)
            .await
            .map_err(CallRelayError::Upstream)?;
        let callee_rooms = self
            .membership_store
            .list_rooms_for_user(to)
            .await
            .map_err(CallRelayError::Upstream)?;
        Ok(caller_rooms.iter().any(|room| callee_rooms.contains(room)))
    }
}
