//! InMemory な外部コラボレーター実装
//!
//! - `InMemoryMembershipAuthority`: 永続的なルームメンバーシップ
//! - `InMemoryMessageStore`: ルームごとのメッセージ履歴（上限付き）

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{
    ChatMessage, CollaboratorError, ConnectionId, MembershipAuthority, MessageStore, RoomId,
};

/// Durable chat-room membership kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryMembershipAuthority {
    memberships: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
}

impl InMemoryMembershipAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant membership. Returns `false` if the user already was a member.
    pub async fn grant(&self, room_id: RoomId, user_id: ConnectionId) -> bool {
        self.memberships
            .write()
            .await
            .entry(room_id)
            .or_default()
            .insert(user_id)
    }

    /// Revoke membership. Returns `false` if the user was not a member.
    pub async fn revoke(&self, room_id: &RoomId, user_id: &ConnectionId) -> bool {
        let mut memberships = self.memberships.write().await;
        let Some(members) = memberships.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(user_id);
        if members.is_empty() {
            memberships.remove(room_id);
        }
        removed
    }
}

#[async_trait]
impl MembershipAuthority for InMemoryMembershipAuthority {
    async fn is_user_member_of_chat_room(
        &self,
        user_id: &ConnectionId,
        room_id: &RoomId,
    ) -> Result<bool, CollaboratorError> {
        Ok(self
            .memberships
            .read()
            .await
            .get(room_id)
            .is_some_and(|members| members.contains(user_id)))
    }
}

/// メッセージ履歴のデフォルト上限（ルームごと）
pub const DEFAULT_HISTORY_CAPACITY: usize = 1_000;

/// Message history kept in memory, bounded per room (oldest dropped first).
#[derive(Debug)]
pub struct InMemoryMessageStore {
    messages: Mutex<HashMap<RoomId, VecDeque<ChatMessage>>>,
    capacity_per_room: usize,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity_per_room: usize) -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            capacity_per_room: capacity_per_room.max(1),
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save_message(&self, message: ChatMessage) -> Result<(), CollaboratorError> {
        let mut messages = self.messages.lock().await;
        let history = messages.entry(message.room_id.clone()).or_default();
        if history.len() == self.capacity_per_room {
            history.pop_front();
        }
        history.push_back(message);
        Ok(())
    }

    async fn recent_messages(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CollaboratorError> {
        let messages = self.messages.lock().await;
        let Some(history) = messages.get(room_id) else {
            return Ok(Vec::new());
        };
        let skip = history.len().saturating_sub(limit);
        Ok(history.iter().skip(skip).cloned().collect())
    }
}
