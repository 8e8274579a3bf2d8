//! External collaborators consumed by the hub.
//!
//! Durable membership and message persistence live outside the hub. These traits are
//! the only questions the hub asks of them.

use async_trait::async_trait;

use super::{
    error::CollaboratorError,
    message::ChatMessage,
    value_object::{ConnectionId, RoomId},
};

/// Authority on durable chat-room membership.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipAuthority: Send + Sync {
    async fn is_user_member_of_chat_room(
        &self,
        user_id: &ConnectionId,
        room_id: &RoomId,
    ) -> Result<bool, CollaboratorError>;
}

/// Durable message store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save_message(&self, message: ChatMessage) -> Result<(), CollaboratorError>;

    /// Most recent messages of a room, oldest first.
    async fn recent_messages(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CollaboratorError>;
}
