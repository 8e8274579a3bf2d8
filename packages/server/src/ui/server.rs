//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{
    Router,
    routing::{get, put},
};
use irori_shared::time::SystemClock;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerConfig,
    domain::{MessageCodec, MessageStore},
    infrastructure::{
        collaborator::{InMemoryMembershipAuthority, InMemoryMessageStore},
        dto::JsonMessageCodec,
        message_pusher::WebSocketMessagePusher,
        registry::InMemoryRoomRegistry,
    },
    usecase::{
        Hub, HubDependencies, PersistenceDispatcher, PostMessageUseCase, RouteMessageUseCase,
    },
};

use super::{
    handler::{
        get_room_detail, get_room_messages, get_rooms, grant_membership, health_check,
        post_message, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Chat hub server
///
/// # Example
///
/// ```ignore
/// let server = Server::from_config(&config);
/// server.run(config.host.clone(), config.port).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Wire the hub against the in-memory collaborators.
    ///
    /// Spawns the hub control loop and the persistence worker, so this must be called
    /// from inside a Tokio runtime.
    pub fn from_config(config: &ServerConfig) -> Self {
        let codec: Arc<dyn MessageCodec> = Arc::new(JsonMessageCodec::new());
        let membership = Arc::new(InMemoryMembershipAuthority::new());
        let message_store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());

        // Hub の制御ループは最後の Hub ハンドルが drop されると終了する
        let (hub, _hub_task) = Hub::spawn(
            HubDependencies {
                pusher: Arc::new(WebSocketMessagePusher::new()),
                registry: Arc::new(InMemoryRoomRegistry::new()),
                membership: membership.clone(),
                codec: codec.clone(),
                clock: Arc::new(SystemClock),
            },
            config.hub_config(),
        );
        let (persistence, _worker) =
            PersistenceDispatcher::spawn(message_store.clone(), config.persistence_queue_capacity);

        let route_message_usecase = Arc::new(RouteMessageUseCase::new(
            hub.clone(),
            codec.clone(),
            persistence.clone(),
        ));
        let post_message_usecase = Arc::new(PostMessageUseCase::new(hub.clone(), persistence));

        Self::new(AppState {
            hub,
            route_message_usecase,
            post_message_usecase,
            membership,
            message_store,
            codec,
            connection: config.connection_config(),
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/rooms", get(get_rooms))
            .route("/api/rooms/{room_id}", get(get_room_detail))
            .route(
                "/api/rooms/{room_id}/messages",
                get(get_room_messages).post(post_message),
            )
            .route(
                "/api/rooms/{room_id}/members/{user_id}",
                put(grant_membership),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Chat hub listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
