//! UseCase layer errors.

use thiserror::Error;

use crate::domain::{CodecError, ErrorCode, MessagePushError, RoomId, ServerEvent};

/// Hub operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("Connection '{0}' is already registered")]
    DuplicateConnection(String),

    #[error("Connection '{0}' is not registered")]
    NotRegistered(String),

    #[error("Hub control loop has stopped")]
    Stopped,

    #[error("Delivery failed: {0}")]
    Delivery(#[from] MessagePushError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failure while routing one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error(transparent)]
    Decode(CodecError),

    #[error("You are not a member of room '{0}'")]
    NotAMember(RoomId),

    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Failure while posting a message over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostMessageError {
    #[error("'{sender}' is not a member of room '{room_id}'")]
    NotAMember { sender: String, room_id: RoomId },

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl From<CodecError> for RouteError {
    fn from(error: CodecError) -> Self {
        Self::Decode(error)
    }
}

impl RouteError {
    /// The `ERROR` event to report back to the sender, if this failure is client-visible.
    pub fn client_event(&self) -> Option<ServerEvent> {
        match self {
            Self::Decode(error) => {
                let code = match error {
                    CodecError::Malformed(_) => ErrorCode::MalformedMessage,
                    CodecError::UnsupportedType(_) => ErrorCode::UnsupportedType,
                    CodecError::MissingRoomId(_)
                    | CodecError::InvalidPayload(_)
                    | CodecError::Encode(_) => ErrorCode::InvalidPayload,
                };
                Some(ServerEvent::Error {
                    room_id: None,
                    code,
                    message: error.to_string(),
                })
            }
            Self::NotAMember(room_id) => Some(ServerEvent::Error {
                room_id: Some(room_id.clone()),
                code: ErrorCode::NotAMember,
                message: self.to_string(),
            }),
            Self::Hub(_) => None,
        }
    }
}
