//! InMemory Room Registry 実装
//!
//! ドメイン層が定義する `RoomRegistry` trait の具体的な実装。
//!
//! ## ロック設計
//!
//! - ルーム一覧（room_id → ルーム）は `RwLock` で粗く保護
//! - 各ルームのメンバー集合はルームごとの `Mutex` で細かく保護
//! - 接続ごとの参加ルーム索引（connection_id → room_id の集合）は、メンバー集合の
//!   変更と同じルームロックの中で更新
//!
//! ルーム A へのブロードキャスト用スナップショット取得は、ルーム B の join / leave と
//! 競合しません。ルームを空にした leave だけが一覧の書き込みロックを取ります。
//! ロック順序は常に「一覧 → ルーム → 索引」です。
//!
//! 切断時の `rooms_of` は索引を 1 回引くだけなので、全ルームを走査しません。

use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{
    ConnectionId, JoinOutcome, LeaveOutcome, Participant, RoomId, RoomPresence, RoomRegistry,
    Timestamp,
};

#[derive(Debug, Default)]
struct RoomMembers {
    members: HashMap<ConnectionId, Timestamp>,
    /// Set once the room has been removed from the directory; joiners holding a stale
    /// reference must retry against a fresh entry.
    retired: bool,
}

type SharedRoom = Arc<Mutex<RoomMembers>>;

/// インメモリ Room Registry 実装
#[derive(Debug, Default)]
pub struct InMemoryRoomRegistry {
    rooms: RwLock<HashMap<RoomId, SharedRoom>>,
    /// Rooms each connection is present in
    connections: Mutex<HashMap<ConnectionId, HashSet<RoomId>>>,
}

impl InMemoryRoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn room(&self, room_id: &RoomId) -> Option<SharedRoom> {
        self.rooms.read().await.get(room_id).cloned()
    }

    async fn room_or_insert(&self, room_id: &RoomId) -> SharedRoom {
        if let Some(room) = self.room(room_id).await {
            return room;
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                tracing::debug!("Room '{}' created", room_id);
                Arc::new(Mutex::new(RoomMembers::default()))
            })
            .clone()
    }

    async fn index_join(&self, connection_id: &ConnectionId, room_id: &RoomId) {
        self.connections
            .lock()
            .await
            .entry(connection_id.clone())
            .or_default()
            .insert(room_id.clone());
    }

    async fn index_leave(&self, connection_id: &ConnectionId, room_id: &RoomId) {
        let mut connections = self.connections.lock().await;
        if let Entry::Occupied(mut entry) = connections.entry(connection_id.clone()) {
            entry.get_mut().remove(room_id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    async fn snapshot_rooms(&self) -> Vec<(RoomId, SharedRoom)> {
        self.rooms
            .read()
            .await
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect()
    }
}

#[async_trait]
impl RoomRegistry for InMemoryRoomRegistry {
    async fn join(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
        joined_at: Timestamp,
    ) -> JoinOutcome {
        loop {
            let shared = self.room_or_insert(room_id).await;
            let mut room = shared.lock().await;
            if room.retired {
                continue;
            }
            return match room.members.entry(connection_id.clone()) {
                Entry::Occupied(_) => JoinOutcome::AlreadyMember,
                Entry::Vacant(entry) => {
                    entry.insert(joined_at);
                    self.index_join(connection_id, room_id).await;
                    JoinOutcome::Joined
                }
            };
        }
    }

    async fn leave(&self, room_id: &RoomId, connection_id: &ConnectionId) -> LeaveOutcome {
        let Some(room) = self.room(room_id).await else {
            return LeaveOutcome::NotMember;
        };

        {
            let mut members = room.lock().await;
            if members.retired || members.members.remove(connection_id).is_none() {
                return LeaveOutcome::NotMember;
            }
            self.index_leave(connection_id, room_id).await;
            if !members.members.is_empty() {
                return LeaveOutcome::Left { room_remains: true };
            }
        }

        // The room looked empty: retire it under the directory write lock. A join that
        // slipped in meanwhile keeps it alive.
        let mut rooms = self.rooms.write().await;
        let mut members = room.lock().await;
        if !members.members.is_empty() {
            return LeaveOutcome::Left { room_remains: true };
        }
        members.retired = true;
        if rooms
            .get(room_id)
            .is_some_and(|current| Arc::ptr_eq(current, &room))
        {
            rooms.remove(room_id);
            tracing::debug!("Room '{}' removed (no live members)", room_id);
        }
        LeaveOutcome::Left {
            room_remains: false,
        }
    }

    async fn members(&self, room_id: &RoomId) -> Vec<Participant> {
        let Some(room) = self.room(room_id).await else {
            return Vec::new();
        };
        let room = room.lock().await;
        if room.retired {
            return Vec::new();
        }
        let mut participants: Vec<Participant> = room
            .members
            .iter()
            .map(|(id, joined_at)| Participant::new(id.clone(), *joined_at))
            .collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));
        participants
    }

    async fn is_member(&self, room_id: &RoomId, connection_id: &ConnectionId) -> bool {
        let Some(room) = self.room(room_id).await else {
            return false;
        };
        let room = room.lock().await;
        !room.retired && room.members.contains_key(connection_id)
    }

    async fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    async fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        let mut joined: Vec<RoomId> = self
            .connections
            .lock()
            .await
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        joined.sort();
        joined
    }

    async fn rooms(&self) -> Vec<RoomPresence> {
        let mut presences = Vec::new();
        for (room_id, room) in self.snapshot_rooms().await {
            let room = room.lock().await;
            if !room.retired && !room.members.is_empty() {
                presences.push(RoomPresence {
                    room_id,
                    member_count: room.members.len(),
                });
            }
        }
        presences.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        presences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - join / leave / members / is_member / rooms_of の基本動作
    // - join の冪等性
    // - 最後のメンバーが leave したらルームが消えること
    // - 並行な join / leave の後も空ルームが残らないこと
    // - 参加ルーム索引（rooms_of）が join / leave に追従すること
    // ========================================

    fn room(id: &str) -> RoomId {
        RoomId::new(id.to_string()).unwrap()
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_join_creates_room_lazily() {
        // テスト項目: 最初の join でルームが作られる
        // given (前提条件):
        let registry = InMemoryRoomRegistry::new();
        assert!(!registry.contains_room(&room("r1")).await);

        // when (操作):
        let outcome = registry
            .join(&room("r1"), &conn("alice"), Timestamp::new(1))
            .await;

        // then (期待する結果):
        assert_eq!(outcome, JoinOutcome::Joined);
        assert!(registry.contains_room(&room("r1")).await);
        assert!(registry.is_member(&room("r1"), &conn("alice")).await);
    }

    #[tokio::test]
    async fn test_join_twice_is_idempotent() {
        // テスト項目: 同じ接続で 2 回 join してもメンバーは重複しない
        // given (前提条件):
        let registry = InMemoryRoomRegistry::new();
        registry
            .join(&room("r1"), &conn("alice"), Timestamp::new(1))
            .await;

        // when (操作):
        let outcome = registry
            .join(&room("r1"), &conn("alice"), Timestamp::new(2))
            .await;

        // then (期待する結果): 最初の joined_at が保持される
        assert_eq!(outcome, JoinOutcome::AlreadyMember);
        let members = registry.members(&room("r1")).await;
        assert_eq!(members, vec![Participant::new(conn("alice"), Timestamp::new(1))]);
    }

    #[tokio::test]
    async fn test_leave_last_member_removes_room() {
        // テスト項目: 最後のメンバーが leave するとルームが削除される
        // given (前提条件):
        let registry = InMemoryRoomRegistry::new();
        registry
            .join(&room("r1"), &conn("alice"), Timestamp::new(1))
            .await;

        // when (操作):
        let outcome = registry.leave(&room("r1"), &conn("alice")).await;

        // then (期待する結果):
        assert_eq!(
            outcome,
            LeaveOutcome::Left {
                room_remains: false
            }
        );
        assert!(!registry.contains_room(&room("r1")).await);
        assert!(registry.members(&room("r1")).await.is_empty());
        assert!(registry.rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_keeps_room_with_remaining_members() {
        // テスト項目: 他のメンバーが残っていればルームは残る
        // given (前提条件):
        let registry = InMemoryRoomRegistry::new();
        registry
            .join(&room("r1"), &conn("alice"), Timestamp::new(1))
            .await;
        registry
            .join(&room("r1"), &conn("bob"), Timestamp::new(2))
            .await;

        // when (操作):
        let outcome = registry.leave(&room("r1"), &conn("alice")).await;

        // then (期待する結果):
        assert_eq!(outcome, LeaveOutcome::Left { room_remains: true });
        let members = registry.members(&room("r1")).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, conn("bob"));
    }

    #[tokio::test]
    async fn test_leave_non_member() {
        // テスト項目: メンバーでない接続の leave は NotMember を返す
        // given (前提条件):
        let registry = InMemoryRoomRegistry::new();
        registry
            .join(&room("r1"), &conn("alice"), Timestamp::new(1))
            .await;

        // when (操作):
        let unknown_room = registry.leave(&room("r2"), &conn("alice")).await;
        let unknown_member = registry.leave(&room("r1"), &conn("bob")).await;

        // then (期待する結果):
        assert_eq!(unknown_room, LeaveOutcome::NotMember);
        assert_eq!(unknown_member, LeaveOutcome::NotMember);
        assert!(registry.contains_room(&room("r1")).await);
    }

    #[tokio::test]
    async fn test_members_sorted_by_id() {
        // テスト項目: members は ID 順にソートされたスナップショットを返す
        // given (前提条件):
        let registry = InMemoryRoomRegistry::new();
        for id in ["charlie", "alice", "bob"] {
            registry
                .join(&room("r1"), &conn(id), Timestamp::new(1))
                .await;
        }

        // when (操作):
        let members = registry.members(&room("r1")).await;

        // then (期待する結果):
        let ids: Vec<&str> = members.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob", "charlie"]);
    }

    #[tokio::test]
    async fn test_rooms_of_lists_every_joined_room() {
        // テスト項目: rooms_of が接続の参加している全ルームを返す
        // given (前提条件):
        let registry = InMemoryRoomRegistry::new();
        registry
            .join(&room("r2"), &conn("alice"), Timestamp::new(1))
            .await;
        registry
            .join(&room("r1"), &conn("alice"), Timestamp::new(1))
            .await;
        registry
            .join(&room("r3"), &conn("bob"), Timestamp::new(1))
            .await;

        // when (操作):
        let rooms = registry.rooms_of(&conn("alice")).await;

        // then (期待する結果):
        assert_eq!(rooms, vec![room("r1"), room("r2")]);
    }

    #[tokio::test]
    async fn test_rooms_of_forgets_left_rooms() {
        // テスト項目: leave したルームは rooms_of から消え、全ルームを抜けると索引も空になる
        // given (前提条件):
        let registry = InMemoryRoomRegistry::new();
        for id in ["r1", "r2"] {
            registry
                .join(&room(id), &conn("alice"), Timestamp::new(1))
                .await;
        }
        registry
            .join(&room("r1"), &conn("bob"), Timestamp::new(1))
            .await;

        // when (操作):
        registry.leave(&room("r1"), &conn("alice")).await;
        let after_first = registry.rooms_of(&conn("alice")).await;
        registry.leave(&room("r2"), &conn("alice")).await;
        let after_second = registry.rooms_of(&conn("alice")).await;

        // then (期待する結果):
        assert_eq!(after_first, vec![room("r2")]);
        assert!(after_second.is_empty());
        assert_eq!(registry.rooms_of(&conn("bob")).await, vec![room("r1")]);
        assert!(!registry.connections.lock().await.contains_key(&conn("alice")));
    }

    #[tokio::test]
    async fn test_concurrent_join_leave_never_leaves_empty_room() {
        // テスト項目: 並行な join / leave の後、空のルームが残らない
        // given (前提条件):
        let registry = Arc::new(InMemoryRoomRegistry::new());
        let mut tasks = Vec::new();

        // when (操作): 複数のタスクが同じルームに join → leave を繰り返す
        for i in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let id = conn(&format!("user-{i}"));
                for _ in 0..50 {
                    registry.join(&room("r1"), &id, Timestamp::new(1)).await;
                    tokio::task::yield_now().await;
                    registry.leave(&room("r1"), &id).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // then (期待する結果):
        assert!(!registry.contains_room(&room("r1")).await);
        assert!(registry.rooms().await.is_empty());
        assert!(registry.connections.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_joins_are_all_recorded() {
        // テスト項目: 退出と競合しても、残っている join は全て記録される
        // given (前提条件):
        let registry = Arc::new(InMemoryRoomRegistry::new());
        registry
            .join(&room("r1"), &conn("leaver"), Timestamp::new(1))
            .await;

        // when (操作): leaver の退出と 8 人の join を並行に実行
        let leave = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.leave(&room("r1"), &conn("leaver")).await })
        };
        let mut joins = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            joins.push(tokio::spawn(async move {
                registry
                    .join(&room("r1"), &conn(&format!("user-{i}")), Timestamp::new(2))
                    .await
            }));
        }
        leave.await.unwrap();
        for join in joins {
            join.await.unwrap();
        }

        // then (期待する結果):
        assert_eq!(registry.members(&room("r1")).await.len(), 8);
        assert!(registry.rooms_of(&conn("leaver")).await.is_empty());
        for i in 0..8 {
            assert_eq!(
                registry.rooms_of(&conn(&format!("user-{i}"))).await,
                vec![room("r1")]
            );
        }
    }
}
