//! PresenceBook
//!
//! Connection Registry と Room Membership Store を 1 つにまとめ、
//! 「接続の最後のメンバーシップを外し、ユーザー集合を更新する」といった
//! 複合操作を 1 回の可変借用の中で完結させる。呼び出し側は 1 つのロックで
//! この構造体全体を保護するので、各操作は他の変更とインターリーブしない。
//!
//! 不変条件: ユーザー U がルーム R のオンライン集合に含まれる
//! ⇔ U の有効な接続のうち少なくとも 1 つが R に join している。

use super::{
    entity::RoomPresence,
    error::RegistryError,
    membership::RoomMembershipStore,
    registry::ConnectionRegistry,
    value_object::{ConnectionId, RoomId, Timestamp, UserId},
};

/// join の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// この接続が新たにルームへ join したか（既に join 済みなら false）
    pub newly_joined: bool,
    /// join 後のルームのオンライン状況
    pub presence: RoomPresence,
}

/// 切断の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnected {
    pub user_id: UserId,
    /// オンライン集合が変化したルームの新しい状況
    pub changed: Vec<RoomPresence>,
}

#[derive(Debug, Default)]
pub struct PresenceBook {
    registry: ConnectionRegistry,
    membership: RoomMembershipStore,
}

impl PresenceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
        connected_at: Timestamp,
    ) -> Result<(), RegistryError> {
        self.registry.register(connection_id, user_id, connected_at)
    }

    /// 接続がまだ登録されているか（切断済みなら false）
    pub fn is_live(&self, connection_id: &ConnectionId) -> bool {
        self.registry.contains(connection_id)
    }

    /// ユーザーの全接続（昇順）
    pub fn connections_of(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.registry.connections_for_user(user_id)
    }

    pub fn user_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.registry.user_of(connection_id)
    }

    pub fn is_joined(&self, connection_id: &ConnectionId, room_id: &RoomId) -> bool {
        self.registry
            .get(connection_id)
            .is_some_and(|c| c.is_in_room(room_id))
    }

    /// 接続が join しているルーム一覧（昇順）
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.registry
            .get(connection_id)
            .map(|c| c.rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 接続をルームに join させ、ユーザーをオンライン集合に加える
    pub fn join(
        &mut self,
        connection_id: &ConnectionId,
        room_id: RoomId,
    ) -> Result<JoinOutcome, RegistryError> {
        let user_id = self
            .registry
            .user_of(connection_id)
            .ok_or(RegistryError::UnknownConnection(*connection_id))?;
        let newly_joined = self.registry.join_room(connection_id, room_id)?;
        self.membership.add_user(room_id, user_id);
        Ok(JoinOutcome {
            newly_joined,
            presence: self.membership.presence(room_id),
        })
    }

    /// 接続をルームから leave させる
    ///
    /// # Returns
    ///
    /// * `Ok(Some(presence))` - ユーザーの最後の接続が抜け、オンライン集合が変化した
    /// * `Ok(None)` - 変化なし（未 join、または同じユーザーの別接続が残っている）
    pub fn leave(
        &mut self,
        connection_id: &ConnectionId,
        room_id: RoomId,
    ) -> Result<Option<RoomPresence>, RegistryError> {
        let user_id = self
            .registry
            .user_of(connection_id)
            .ok_or(RegistryError::UnknownConnection(*connection_id))?;
        if !self.registry.leave_room(connection_id, &room_id)? {
            return Ok(None);
        }
        Ok(self.drop_user_if_last(user_id, room_id))
    }

    /// 接続を切断する（冪等）
    ///
    /// 未登録の接続に対しては `None`。2 回呼んでもメンバーシップを二重に減らさない。
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Option<Disconnected> {
        let connection = self.registry.unregister(connection_id)?;
        let user_id = connection.user_id;
        let changed = connection
            .rooms
            .iter()
            .filter_map(|room_id| self.drop_user_if_last(user_id, *room_id))
            .collect();
        Some(Disconnected { user_id, changed })
    }

    /// メンバーの生きている接続を、まだ join していなければルームに join させる
    ///
    /// 明示的に leave した接続は対象外。
    ///
    /// # Returns
    ///
    /// オンライン集合が変化した場合、ルームの新しい状況
    pub fn admit_live_members(
        &mut self,
        room_id: RoomId,
        members: &[UserId],
    ) -> Option<RoomPresence> {
        let mut changed = false;
        for user_id in members {
            let pending: Vec<ConnectionId> = self
                .registry
                .connections_for_user(user_id)
                .into_iter()
                .filter(|id| {
                    self.registry
                        .get(id)
                        .is_some_and(|c| !c.is_in_room(&room_id) && !c.has_left(&room_id))
                })
                .collect();
            for connection_id in pending {
                if self.registry.join_room(&connection_id, room_id).is_ok() {
                    changed |= self.membership.add_user(room_id, *user_id);
                }
            }
        }
        changed.then(|| self.membership.presence(room_id))
    }

    pub fn presence(&self, room_id: RoomId) -> RoomPresence {
        self.membership.presence(room_id)
    }

    pub fn online_users(&self, room_id: &RoomId) -> Vec<UserId> {
        self.membership.online_users(room_id)
    }

    /// ルームへの配信対象となる接続（昇順、重複なし）
    ///
    /// オンラインユーザー → 各ユーザーの接続のうちルームに join しているもの、の順に解決する。
    pub fn delivery_targets(
        &self,
        room_id: &RoomId,
        exclude: Option<&ConnectionId>,
    ) -> Vec<ConnectionId> {
        let mut targets: Vec<ConnectionId> = self
            .membership
            .online_users(room_id)
            .iter()
            .flat_map(|user_id| self.registry.connections_in_room(user_id, room_id))
            .filter(|id| Some(id) != exclude)
            .collect();
        targets.sort();
        targets
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    fn drop_user_if_last(&mut self, user_id: UserId, room_id: RoomId) -> Option<RoomPresence> {
        if self.registry.user_in_room(&user_id, &room_id) {
            return None;
        }
        self.membership.remove_user(&room_id, &user_id);
        Some(self.membership.presence(room_id))
    }
}
