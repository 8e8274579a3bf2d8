//! Shared application state.

use std::{sync::Arc, time::Duration};

use crate::{
    domain::{MessageCodec, MessageStore},
    infrastructure::collaborator::InMemoryMembershipAuthority,
    usecase::{Hub, PostMessageUseCase, RouteMessageUseCase},
};

/// Per-connection transport settings used by the read and write pumps.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Outbound queue slots; overflowing them disconnects the client
    pub outbound_capacity: usize,
    /// Liveness ping period on an idle connection
    pub ping_interval: Duration,
    /// Read deadline; silence longer than this is treated as a dead peer
    pub pong_wait: Duration,
    /// Write deadline for one batch, ping or close frame
    pub write_wait: Duration,
    /// Largest inbound frame in bytes
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            ping_interval: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_message_size: 64 * 1024,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Hub（接続とルームの調停役）
    pub hub: Hub,
    /// 受信フレームのルーティング
    pub route_message_usecase: Arc<RouteMessageUseCase>,
    /// HTTP 経由のメッセージ投稿
    pub post_message_usecase: Arc<PostMessageUseCase>,
    /// メンバーシップの付与先（in-memory のスタンドイン）
    pub membership: Arc<InMemoryMembershipAuthority>,
    /// メッセージ履歴の参照先
    pub message_store: Arc<dyn MessageStore>,
    /// Hub に登録できなかった接続への応答用
    pub codec: Arc<dyn MessageCodec>,
    pub connection: ConnectionConfig,
}
