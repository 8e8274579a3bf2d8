//! HTTP and WebSocket handlers.

mod http;
mod websocket;

pub use http::{
    get_room_detail, get_room_messages, get_rooms, grant_membership, health_check, post_message,
};
pub use websocket::websocket_handler;
