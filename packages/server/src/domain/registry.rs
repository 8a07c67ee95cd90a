//! Connection Registry
//!
//! 認証済み接続とユーザー ID の対応、および各接続が join しているルームを管理する
//! インメモリのインデックス。ネットワーク I/O は行わない。
//!
//! ユーザー ID から接続を引く逆引きインデックス（`by_user`）を持つため、
//! ルーティング時に全接続を走査する必要がない。

use std::collections::{HashMap, HashSet};

use super::{
    entity::Connection,
    error::RegistryError,
    value_object::{ConnectionId, RoomId, Timestamp, UserId},
};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接続にユーザーを紐付ける
    ///
    /// 同じ接続に対して unregister を挟まずに 2 回呼ぶと `AlreadyRegistered`。
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
        connected_at: Timestamp,
    ) -> Result<(), RegistryError> {
        if self.connections.contains_key(&connection_id) {
            return Err(RegistryError::AlreadyRegistered(connection_id));
        }
        self.connections.insert(
            connection_id,
            Connection::new(connection_id, user_id, connected_at),
        );
        self.by_user
            .entry(user_id)
            .or_default()
            .insert(connection_id);
        Ok(())
    }

    /// 接続を削除する（冪等）
    ///
    /// 未登録の接続に対しては何もせず `None` を返す。削除した場合は、
    /// 削除直前の接続（join していたルームを含む）を返す。
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(connection_id)?;
        if let Some(ids) = self.by_user.get_mut(&connection.user_id) {
            ids.remove(connection_id);
            if ids.is_empty() {
                self.by_user.remove(&connection.user_id);
            }
        }
        Some(connection)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn user_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.connections.get(connection_id).map(|c| c.user_id)
    }

    /// ユーザーの接続 ID 一覧（昇順、未接続なら空）
    pub fn connections_for_user(&self, user_id: &UserId) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .by_user
            .get(user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// ルームに join する
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - 新たに join した
    /// * `Ok(false)` - 既に join 済み
    pub fn join_room(
        &mut self,
        connection_id: &ConnectionId,
        room_id: RoomId,
    ) -> Result<bool, RegistryError> {
        let connection = self
            .connections
            .get_mut(connection_id)
            .ok_or(RegistryError::UnknownConnection(*connection_id))?;
        connection.left_rooms.remove(&room_id);
        Ok(connection.rooms.insert(room_id))
    }

    /// ルームから leave する
    ///
    /// leave したルームは、再度 join するまで自動 join の対象外になる。
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - join していたので leave した
    /// * `Ok(false)` - もともと join していなかった
    pub fn leave_room(
        &mut self,
        connection_id: &ConnectionId,
        room_id: &RoomId,
    ) -> Result<bool, RegistryError> {
        let connection = self
            .connections
            .get_mut(connection_id)
            .ok_or(RegistryError::UnknownConnection(*connection_id))?;
        connection.left_rooms.insert(*room_id);
        Ok(connection.rooms.remove(room_id))
    }

    /// ユーザーのいずれかの接続がルームに join しているか
    pub fn user_in_room(&self, user_id: &UserId, room_id: &RoomId) -> bool {
        self.by_user.get(user_id).is_some_and(|ids| {
            ids.iter().any(|id| {
                self.connections
                    .get(id)
                    .is_some_and(|c| c.is_in_room(room_id))
            })
        })
    }

    /// ユーザーの接続のうち、ルームに join しているもの（昇順）
    pub fn connections_in_room(&self, user_id: &UserId, room_id: &RoomId) -> Vec<ConnectionId> {
        self.connections_for_user(user_id)
            .into_iter()
            .filter(|id| {
                self.connections
                    .get(id)
                    .is_some_and(|c| c.is_in_room(room_id))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
