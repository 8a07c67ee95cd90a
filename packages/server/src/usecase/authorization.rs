//! ルームメンバーシップによる認可

use crate::domain::{ChatMembershipStore, RoomId, StoreError, UserId};

/// ユーザーがルームのメンバーか外部ストアに問い合わせる
pub(crate) async fn is_member(
    store: &dyn ChatMembershipStore,
    room_id: RoomId,
    user_id: UserId,
) -> Result<bool, StoreError> {
    let members = store.list_members(room_id).await?;
    Ok(members.contains(&user_id))
}
