//! Room Membership Store
//!
//! ルーム ID → オンラインのユーザー ID 集合。接続単位ではなく「ユーザー単位」の
//! ビューだけを持つ。最後の接続が抜けたときにだけ `remove_user` を呼ぶのは
//! 呼び出し側（`PresenceBook`）の責務。
//!
//! 空になったエントリは削除する。未知のルームは常に空として扱う。

use std::collections::{BTreeSet, HashMap};

use super::{
    entity::RoomPresence,
    value_object::{RoomId, UserId},
};

#[derive(Debug, Default)]
pub struct RoomMembershipStore {
    rooms: HashMap<RoomId, BTreeSet<UserId>>,
}

impl RoomMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーをルームのオンライン集合に追加する。新たに追加された場合 `true`。
    pub fn add_user(&mut self, room_id: RoomId, user_id: UserId) -> bool {
        self.rooms.entry(room_id).or_default().insert(user_id)
    }

    /// ユーザーをルームのオンライン集合から削除する。削除された場合 `true`。
    pub fn remove_user(&mut self, room_id: &RoomId, user_id: &UserId) -> bool {
        let Some(users) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = users.remove(user_id);
        if users.is_empty() {
            self.rooms.remove(room_id);
        }
        removed
    }

    /// オンラインのユーザー一覧（昇順）。未知のルームは空。
    pub fn online_users(&self, room_id: &RoomId) -> Vec<UserId> {
        self.rooms
            .get(room_id)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn presence(&self, room_id: RoomId) -> RoomPresence {
        RoomPresence::new(room_id, self.online_users(&room_id))
    }

    /// オンラインユーザーが 1 人以上いるルームの数
    pub fn active_room_count(&self) -> usize {
        self.rooms.len()
    }
}
