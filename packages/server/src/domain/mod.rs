//! Domain layer: value objects, the typed message model, live connection handles and
//! the traits the hub depends on.
//!
//! Concrete implementations of the traits live in the infrastructure layer.

pub mod codec;
pub mod collaborator;
pub mod connection;
pub mod error;
pub mod message;
pub mod pusher;
pub mod registry;
pub mod value_object;

pub use codec::MessageCodec;
pub use collaborator::{MembershipAuthority, MessageStore};
pub use connection::{ConnectionHandle, OutboundFrame, OutboundReceiver};
pub use error::{CodecError, CollaboratorError, MessagePushError, ValueObjectError};
pub use message::{
    ChatMessage, ClientIntent, ErrorCode, Participant, Sender, ServerEvent, SocketMessage,
};
pub use pusher::{BroadcastReport, MessagePusher};
pub use registry::{JoinOutcome, LeaveOutcome, RoomPresence, RoomRegistry};
pub use value_object::{
    ConnectionId, MessageContent, MessageId, MessageIdFactory, RoomId, Timestamp,
};
