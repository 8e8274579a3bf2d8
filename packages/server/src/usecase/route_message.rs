//! UseCase: 受信フレームのルーティング
//!
//! 1 フレームを [`ClientIntent`] にデコードし、種類ごとに Hub の操作へ振り分けます。
//!
//! | 種類 | 前提条件 | 処理 |
//! |---|---|---|
//! | JOIN_ROOM | ルーム ID あり | `Hub::join_room_with_response` |
//! | LEAVE | ルーム ID あり | `Hub::leave_room` |
//! | CHAT | 送信者がルームのメンバー | 永続化キューへ投入し、ルームへブロードキャスト |
//! | TYPING / READ_RECEIPT | 送信者がルームのメンバー | ブロードキャスト（メンバーでなければ黙って破棄） |
//! | PING | なし | 送信者へ PONG |
//!
//! 送信者 ID とタイムスタンプは常にサーバー側で付与します（クライアントの値は無視）。

use std::sync::Arc;

use crate::domain::{
    ChatMessage, ClientIntent, ConnectionId, MessageCodec, MessageIdFactory, RoomId, ServerEvent,
    SocketMessage,
};

use super::{error::RouteError, hub::Hub, persistence::PersistenceDispatcher};

/// メッセージルーティングのユースケース
pub struct RouteMessageUseCase {
    hub: Hub,
    codec: Arc<dyn MessageCodec>,
    persistence: PersistenceDispatcher,
}

impl RouteMessageUseCase {
    pub fn new(hub: Hub, codec: Arc<dyn MessageCodec>, persistence: PersistenceDispatcher) -> Self {
        Self {
            hub,
            codec,
            persistence,
        }
    }

    /// Route one inbound text frame from `sender`.
    ///
    /// Client-visible failures are also reported to the sender as an `ERROR` envelope
    /// before being returned.
    pub async fn execute(&self, sender: &ConnectionId, raw: &str) -> Result<(), RouteError> {
        let result = self.route(sender, raw).await;
        if let Err(error) = &result {
            tracing::debug!("Rejected frame from '{}': {}", sender, error);
            if let Some(event) = error.client_event() {
                let reply = SocketMessage::from_server(event, self.hub.now());
                if let Err(e) = self.hub.send_to(sender, &reply).await {
                    tracing::warn!("Failed to report error to '{}': {}", sender, e);
                }
            }
        }
        result
    }

    async fn route(&self, sender: &ConnectionId, raw: &str) -> Result<(), RouteError> {
        let intent = self.codec.decode(raw)?;
        if let Some(room_id) = intent.room_id() {
            tracing::trace!("Routing frame from '{}' for room '{}'", sender, room_id);
        }
        match intent {
            ClientIntent::Ping => {
                let pong = SocketMessage::from_server(ServerEvent::Pong, self.hub.now());
                self.hub.send_to(sender, &pong).await?;
            }
            ClientIntent::Join { room_id } => {
                self.hub.join_room_with_response(&room_id, sender).await?;
            }
            ClientIntent::Leave { room_id } => {
                self.hub.leave_room(&room_id, sender).await?;
            }
            ClientIntent::Chat { room_id, content } => {
                if !self.hub.is_member(&room_id, sender).await {
                    return Err(RouteError::NotAMember(room_id));
                }
                let message = ChatMessage {
                    id: MessageIdFactory::generate(),
                    room_id,
                    from: sender.clone(),
                    content,
                    sent_at: self.hub.now(),
                };
                self.persistence.dispatch(message.clone());

                let event = ServerEvent::Chat {
                    room_id: message.room_id.clone(),
                    message_id: message.id,
                    content: message.content,
                };
                let outbound = SocketMessage::from_user(sender.clone(), event, message.sent_at);
                self.hub.broadcast_to_room(&message.room_id, &outbound).await?;
            }
            ClientIntent::Typing { room_id, is_typing } => {
                self.relay_if_member(sender, &room_id, ServerEvent::Typing {
                    room_id: room_id.clone(),
                    is_typing,
                })
                .await?;
            }
            ClientIntent::ReadReceipt {
                room_id,
                message_id,
            } => {
                self.relay_if_member(sender, &room_id, ServerEvent::ReadReceipt {
                    room_id: room_id.clone(),
                    message_id,
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Best-effort signals from non-members are dropped without telling anyone.
    async fn relay_if_member(
        &self,
        sender: &ConnectionId,
        room_id: &RoomId,
        event: ServerEvent,
    ) -> Result<(), RouteError> {
        if !self.hub.is_member(room_id, sender).await {
            tracing::debug!(
                "Dropping signal from '{}' for room '{}' (not present)",
                sender,
                room_id
            );
            return Ok(());
        }
        let outbound = SocketMessage::from_user(sender.clone(), event, self.hub.now());
        self.hub.broadcast_to_room(room_id, &outbound).await?;
        Ok(())
    }
}
