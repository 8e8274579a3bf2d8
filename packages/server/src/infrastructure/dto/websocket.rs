//! WebSocket message DTOs.

use serde::{Deserialize, Serialize};

/// Sender id stamped on envelopes the hub originates itself.
pub const SERVER_SENDER_ID: &str = "server";

/// Wire value of the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Chat,
    JoinRoom,
    Leave,
    Typing,
    ReadReceipt,
    Ping,
    Users,
    JoinSuccess,
    JoinError,
    UserJoined,
    UserLeft,
    Error,
    Pong,
    NewMessage,
}

/// Envelope as received from a client.
///
/// `type` stays a string here so an unknown value can be echoed back in the error.
/// `sender_id` and `timestamp` are accepted but never trusted.
#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    pub r#type: String,
    #[serde(default)]
    pub chat_room_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Envelope as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub r#type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_room_id: Option<String>,
    pub sender_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Inbound `CHAT` payload: either `{"content": "..."}` or a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChatRequestData {
    Object { content: String },
    Text(String),
}

impl ChatRequestData {
    pub fn into_content(self) -> String {
        match self {
            Self::Object { content } | Self::Text(content) => content,
        }
    }
}

/// Outbound `CHAT` / `NEW_MESSAGE` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatData {
    pub message_id: String,
    pub content: String,
}

fn default_is_typing() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingData {
    #[serde(default = "default_is_typing")]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceiptData {
    pub message_id: String,
}

/// Participant information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub user_id: String,
    pub joined_at: i64,
}

/// `USERS` / `JOIN_SUCCESS` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersData {
    pub users: Vec<ParticipantInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinErrorData {
    pub reason: String,
}

/// `USER_JOINED` / `USER_LEFT` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEventData {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}
