//! UseCase: HTTP 経由のメッセージ投稿
//!
//! REST で投稿されたメッセージを永続化キューに渡し、ルームのライブメンバーへ
//! `NEW_MESSAGE` として配信します。
//!
//! 投稿者は WebSocket の CHAT と同じく、そのルームのライブメンバーでなければなりません。

use crate::domain::{
    BroadcastReport, ChatMessage, ConnectionId, MessageContent, MessageId, MessageIdFactory,
    RoomId, ServerEvent, SocketMessage,
};

use super::{error::PostMessageError, hub::Hub, persistence::PersistenceDispatcher};

/// メッセージ投稿のユースケース
pub struct PostMessageUseCase {
    hub: Hub,
    persistence: PersistenceDispatcher,
}

impl PostMessageUseCase {
    pub fn new(hub: Hub, persistence: PersistenceDispatcher) -> Self {
        Self { hub, persistence }
    }

    /// Persist and fan out one posted message.
    ///
    /// # Returns
    ///
    /// * `Ok((MessageId, BroadcastReport))` - the assigned id and live delivery result
    /// * `Err(PostMessageError::NotAMember)` - the sender is not present in the room;
    ///   nothing is persisted or sent
    /// * `Err(PostMessageError::Hub)` - the event could not be encoded
    pub async fn execute(
        &self,
        sender: ConnectionId,
        room_id: RoomId,
        content: MessageContent,
    ) -> Result<(MessageId, BroadcastReport), PostMessageError> {
        if !self.hub.is_member(&room_id, &sender).await {
            return Err(PostMessageError::NotAMember {
                sender: sender.into_string(),
                room_id,
            });
        }

        let message = ChatMessage {
            id: MessageIdFactory::generate(),
            room_id,
            from: sender,
            content,
            sent_at: self.hub.now(),
        };
        self.persistence.dispatch(message.clone());

        let ChatMessage {
            id,
            room_id,
            from,
            content,
            sent_at,
        } = message;
        let event = ServerEvent::NewMessage {
            room_id: room_id.clone(),
            message_id: id.clone(),
            content,
        };
        let report = self
            .hub
            .broadcast_to_room(&room_id, &SocketMessage::from_user(from, event, sent_at))
            .await?;
        tracing::info!(
            "Posted message '{}' to '{}' ({} live recipients)",
            id,
            room_id,
            report.delivered
        );
        Ok((id, report))
    }
}
