//! Conversion between the WebSocket DTOs and the typed message model.

use std::sync::Arc;

use serde::{Deserialize, Serialize, de::IntoDeserializer};

use crate::domain::{
    ClientIntent, CodecError, MessageCodec, MessageContent, MessageId, OutboundFrame,
    Participant, RoomId, Sender, ServerEvent, SocketMessage,
};
use crate::infrastructure::dto::websocket as dto;

/// JSON codec for the WebSocket envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMessageCodec;

impl JsonMessageCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for JsonMessageCodec {
    fn decode(&self, raw: &str) -> Result<ClientIntent, CodecError> {
        let envelope: dto::InboundEnvelope =
            serde_json::from_str(raw).map_err(|e| CodecError::Malformed(e.to_string()))?;

        let deserializer: serde::de::value::StrDeserializer<'_, serde::de::value::Error> =
            envelope.r#type.as_str().into_deserializer();
        let message_type = dto::MessageType::deserialize(deserializer)
            .map_err(|_| CodecError::UnsupportedType(envelope.r#type.clone()))?;

        match message_type {
            dto::MessageType::Ping => Ok(ClientIntent::Ping),
            dto::MessageType::JoinRoom => Ok(ClientIntent::Join {
                room_id: require_room_id(&envelope, "JOIN_ROOM")?,
            }),
            dto::MessageType::Leave => Ok(ClientIntent::Leave {
                room_id: require_room_id(&envelope, "LEAVE")?,
            }),
            dto::MessageType::Chat => {
                let room_id = require_room_id(&envelope, "CHAT")?;
                let data: dto::ChatRequestData = parse_data(envelope.data)?;
                let content = MessageContent::new(data.into_content())
                    .map_err(|e| CodecError::InvalidPayload(e.to_string()))?;
                Ok(ClientIntent::Chat { room_id, content })
            }
            dto::MessageType::Typing => {
                let room_id = require_room_id(&envelope, "TYPING")?;
                let is_typing = if envelope.data.is_null() {
                    true
                } else {
                    parse_data::<dto::TypingData>(envelope.data)?.is_typing
                };
                Ok(ClientIntent::Typing { room_id, is_typing })
            }
            dto::MessageType::ReadReceipt => {
                let room_id = require_room_id(&envelope, "READ_RECEIPT")?;
                let data: dto::ReadReceiptData = parse_data(envelope.data)?;
                let message_id = MessageId::new(data.message_id)
                    .map_err(|e| CodecError::InvalidPayload(e.to_string()))?;
                Ok(ClientIntent::ReadReceipt {
                    room_id,
                    message_id,
                })
            }
            // Server-to-client types are never accepted from a client
            _ => Err(CodecError::UnsupportedType(envelope.r#type)),
        }
    }

    fn encode(&self, message: &SocketMessage) -> Result<OutboundFrame, CodecError> {
        let envelope = dto::OutboundEnvelope::try_from(message)?;
        let json =
            serde_json::to_string(&envelope).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Arc::from(json))
    }
}

fn require_room_id(
    envelope: &dto::InboundEnvelope,
    message_type: &'static str,
) -> Result<RoomId, CodecError> {
    match envelope.chat_room_id.as_deref() {
        None | Some("") => Err(CodecError::MissingRoomId(message_type)),
        Some(raw) => {
            RoomId::new(raw.to_string()).map_err(|e| CodecError::InvalidPayload(e.to_string()))
        }
    }
}

fn parse_data<T: for<'de> Deserialize<'de>>(data: serde_json::Value) -> Result<T, CodecError> {
    serde_json::from_value(data).map_err(|e| CodecError::InvalidPayload(e.to_string()))
}

fn to_data<T: Serialize>(data: &T) -> Result<serde_json::Value, CodecError> {
    serde_json::to_value(data).map_err(|e| CodecError::Encode(e.to_string()))
}

fn users_data(users: &[Participant]) -> dto::UsersData {
    dto::UsersData {
        users: users.iter().cloned().map(Into::into).collect(),
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<Participant> for dto::ParticipantInfo {
    fn from(model: Participant) -> Self {
        Self {
            user_id: model.id.into_string(),
            joined_at: model.joined_at.value(),
        }
    }
}

impl TryFrom<&SocketMessage> for dto::OutboundEnvelope {
    type Error = CodecError;

    fn try_from(message: &SocketMessage) -> Result<Self, Self::Error> {
        let (r#type, data) = match &message.event {
            ServerEvent::Chat {
                message_id,
                content,
                ..
            } => (
                dto::MessageType::Chat,
                to_data(&dto::ChatData {
                    message_id: message_id.as_str().to_string(),
                    content: content.as_str().to_string(),
                })?,
            ),
            ServerEvent::NewMessage {
                message_id,
                content,
                ..
            } => (
                dto::MessageType::NewMessage,
                to_data(&dto::ChatData {
                    message_id: message_id.as_str().to_string(),
                    content: content.as_str().to_string(),
                })?,
            ),
            ServerEvent::Typing { is_typing, .. } => (
                dto::MessageType::Typing,
                to_data(&dto::TypingData {
                    is_typing: *is_typing,
                })?,
            ),
            ServerEvent::ReadReceipt { message_id, .. } => (
                dto::MessageType::ReadReceipt,
                to_data(&dto::ReadReceiptData {
                    message_id: message_id.as_str().to_string(),
                })?,
            ),
            ServerEvent::Pong => (dto::MessageType::Pong, serde_json::Value::Null),
            ServerEvent::Users { users, .. } => {
                (dto::MessageType::Users, to_data(&users_data(users))?)
            }
            ServerEvent::JoinSuccess { users, .. } => {
                (dto::MessageType::JoinSuccess, to_data(&users_data(users))?)
            }
            ServerEvent::JoinError { reason, .. } => (
                dto::MessageType::JoinError,
                to_data(&dto::JoinErrorData {
                    reason: reason.clone(),
                })?,
            ),
            ServerEvent::UserJoined { user_id, .. } => (
                dto::MessageType::UserJoined,
                to_data(&dto::UserEventData {
                    user_id: user_id.as_str().to_string(),
                })?,
            ),
            ServerEvent::UserLeft { user_id, .. } => (
                dto::MessageType::UserLeft,
                to_data(&dto::UserEventData {
                    user_id: user_id.as_str().to_string(),
                })?,
            ),
            ServerEvent::Error { code, message, .. } => (
                dto::MessageType::Error,
                to_data(&dto::ErrorData {
                    code: code.as_str().to_string(),
                    message: message.clone(),
                })?,
            ),
        };

        let sender_id = match &message.sender {
            Sender::Server => dto::SERVER_SENDER_ID.to_string(),
            Sender::User(id) => id.as_str().to_string(),
        };

        Ok(Self {
            r#type,
            chat_room_id: message.event.room_id().map(|id| id.as_str().to_string()),
            sender_id,
            timestamp: message.timestamp.value(),
            data,
        })
    }
}
