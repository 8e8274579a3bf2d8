//! Domain error types.

use thiserror::Error;

/// Validation failure while building a value object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} is too long ({actual} > {max} characters)")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("{0} contains control characters")]
    InvalidCharacter(&'static str),
}

/// Failure to enqueue a frame onto a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("Client '{0}' not found")]
    ClientNotFound(String),

    #[error("Client '{0}' is already connected")]
    DuplicateClient(String),

    #[error("Outbound queue of client '{0}' is full")]
    QueueFull(String),

    #[error("Connection of client '{0}' is closed")]
    Closed(String),
}

/// Failure to decode an inbound frame or encode an outbound one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unsupported message type: {0}")]
    UnsupportedType(String),

    #[error("Message type {0} requires chat_room_id")]
    MissingRoomId(&'static str),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Failure reported by an external collaborator (membership authority, message store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator did not answer within {0} ms")]
    Timeout(u64),
}
