//! Wire codec abstraction.

use super::{
    connection::OutboundFrame,
    error::CodecError,
    message::{ClientIntent, SocketMessage},
};

/// Translates between wire frames and the typed message model.
pub trait MessageCodec: Send + Sync {
    /// Decode one inbound text frame. Client-supplied sender and timestamp are ignored.
    fn decode(&self, raw: &str) -> Result<ClientIntent, CodecError>;

    /// Serialize one outbound envelope.
    fn encode(&self, message: &SocketMessage) -> Result<OutboundFrame, CodecError>;
}
