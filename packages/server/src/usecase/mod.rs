//! UseCase layer: the hub, the message router and the persistence boundary.

pub mod error;
pub mod hub;
pub mod persistence;
pub mod post_message;
pub mod route_message;

pub use error::{HubError, PostMessageError, RouteError};
pub use hub::{DisconnectReason, Hub, HubConfig, HubDependencies, JoinResponse};
pub use persistence::PersistenceDispatcher;
pub use post_message::PostMessageUseCase;
pub use route_message::RouteMessageUseCase;
