//! Data Transfer Objects (DTOs) for the chat hub.
//!
//! DTOs are organized by protocol:
//! - `websocket`: WebSocket envelope and per-type payload DTOs
//! - `http`: HTTP API request/response DTOs
//!
//! `conversion` implements the JSON [`MessageCodec`](crate::domain::MessageCodec) on top
//! of the WebSocket DTOs.

pub mod conversion;
pub mod http;
pub mod websocket;

pub use conversion::JsonMessageCodec;
