//! UI layer: axum server, identity extraction, WebSocket and HTTP handlers.

mod handler;
mod identity;
mod server;
mod signal;
pub mod state;

pub use identity::{AuthenticatedUser, USER_ID_HEADER};
pub use server::Server;
pub use signal::shutdown_signal;
pub use state::{AppState, ConnectionConfig};
