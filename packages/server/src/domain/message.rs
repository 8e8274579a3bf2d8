//! Typed message model.
//!
//! Inbound frames are decoded into a [`ClientIntent`] at the router boundary and
//! outbound frames are built from a [`SocketMessage`], so nothing past the codec ever
//! looks at raw JSON.

use super::value_object::{ConnectionId, MessageContent, MessageId, RoomId, Timestamp};

/// What a client asked for in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIntent {
    Chat {
        room_id: RoomId,
        content: MessageContent,
    },
    Join {
        room_id: RoomId,
    },
    Leave {
        room_id: RoomId,
    },
    Typing {
        room_id: RoomId,
        is_typing: bool,
    },
    ReadReceipt {
        room_id: RoomId,
        message_id: MessageId,
    },
    Ping,
}

impl ClientIntent {
    /// Room the intent targets, if any
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::Chat { room_id, .. }
            | Self::Join { room_id }
            | Self::Leave { room_id }
            | Self::Typing { room_id, .. }
            | Self::ReadReceipt { room_id, .. } => Some(room_id),
            Self::Ping => None,
        }
    }
}

/// Live presence of one connection in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ConnectionId,
    pub joined_at: Timestamp,
}

impl Participant {
    pub fn new(id: ConnectionId, joined_at: Timestamp) -> Self {
        Self { id, joined_at }
    }
}

/// A chat message handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub from: ConnectionId,
    pub content: MessageContent,
    pub sent_at: Timestamp,
}

/// Machine-readable code carried by `ERROR` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedMessage,
    UnsupportedType,
    InvalidPayload,
    NotAMember,
    DuplicateConnection,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedMessage => "MALFORMED_MESSAGE",
            Self::UnsupportedType => "UNSUPPORTED_TYPE",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::NotAMember => "NOT_A_MEMBER",
            Self::DuplicateConnection => "DUPLICATE_CONNECTION",
        }
    }
}

/// Everything the server sends to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Chat {
        room_id: RoomId,
        message_id: MessageId,
        content: MessageContent,
    },
    NewMessage {
        room_id: RoomId,
        message_id: MessageId,
        content: MessageContent,
    },
    Typing {
        room_id: RoomId,
        is_typing: bool,
    },
    ReadReceipt {
        room_id: RoomId,
        message_id: MessageId,
    },
    Pong,
    Users {
        room_id: RoomId,
        users: Vec<Participant>,
    },
    JoinSuccess {
        room_id: RoomId,
        users: Vec<Participant>,
    },
    JoinError {
        room_id: RoomId,
        reason: String,
    },
    UserJoined {
        room_id: RoomId,
        user_id: ConnectionId,
    },
    UserLeft {
        room_id: RoomId,
        user_id: ConnectionId,
    },
    Error {
        room_id: Option<RoomId>,
        code: ErrorCode,
        message: String,
    },
}

impl ServerEvent {
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::Chat { room_id, .. }
            | Self::NewMessage { room_id, .. }
            | Self::Typing { room_id, .. }
            | Self::ReadReceipt { room_id, .. }
            | Self::Users { room_id, .. }
            | Self::JoinSuccess { room_id, .. }
            | Self::JoinError { room_id, .. }
            | Self::UserJoined { room_id, .. }
            | Self::UserLeft { room_id, .. } => Some(room_id),
            Self::Error { room_id, .. } => room_id.as_ref(),
            Self::Pong => None,
        }
    }
}

/// Who an outbound envelope is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// Events originated by the hub itself
    Server,
    /// Events relayed on behalf of an authenticated connection
    User(ConnectionId),
}

/// Outbound envelope: an event stamped with its sender and server time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketMessage {
    pub sender: Sender,
    pub timestamp: Timestamp,
    pub event: ServerEvent,
}

impl SocketMessage {
    pub fn from_server(event: ServerEvent, timestamp: Timestamp) -> Self {
        Self {
            sender: Sender::Server,
            timestamp,
            event,
        }
    }

    pub fn from_user(sender: ConnectionId, event: ServerEvent, timestamp: Timestamp) -> Self {
        Self {
            sender: Sender::User(sender),
            timestamp,
            event,
        }
    }
}
