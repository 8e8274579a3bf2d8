//! Room Registry trait 定義
//!
//! ルーム ID から「いま接続しているメンバー」への対応（プレゼンス）を管理する
//! インターフェース。永続化されたルームメンバーシップとは別物です。

use async_trait::async_trait;

use super::{
    message::Participant,
    value_object::{ConnectionId, RoomId, Timestamp},
};

/// Result of [`RoomRegistry::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection was added (the room may have been created for it)
    Joined,
    /// The connection was already present; nothing changed
    AlreadyMember,
}

/// Result of [`RoomRegistry::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection was not present in the room
    NotMember,
    /// The connection was removed; `room_remains` is false when it was the last member
    Left { room_remains: bool },
}

/// Summary of one live room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPresence {
    pub room_id: RoomId,
    pub member_count: usize,
}

/// Live room presence.
///
/// Invariant: a room without members is never observable; it is removed by the leave
/// that empties it.
#[async_trait]
pub trait RoomRegistry: Send + Sync {
    /// Add a connection to a room, creating the room if absent. Idempotent.
    async fn join(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
        joined_at: Timestamp,
    ) -> JoinOutcome;

    /// Remove a connection from a room, deleting the room when it becomes empty.
    async fn leave(&self, room_id: &RoomId, connection_id: &ConnectionId) -> LeaveOutcome;

    /// Point-in-time snapshot of a room's members, sorted by id. Empty if absent.
    async fn members(&self, room_id: &RoomId) -> Vec<Participant>;

    async fn is_member(&self, room_id: &RoomId, connection_id: &ConnectionId) -> bool;

    async fn contains_room(&self, room_id: &RoomId) -> bool;

    /// Every room the connection is currently present in.
    async fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomId>;

    /// Every live room, sorted by id.
    async fn rooms(&self) -> Vec<RoomPresence>;
}
