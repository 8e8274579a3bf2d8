//! MessagePusher trait 定義
//!
//! 接続テーブル（接続 ID → ConnectionHandle）と、送信キューへのノンブロッキングな
//! 書き込みを抽象化します。

use async_trait::async_trait;

use super::{
    connection::{ConnectionHandle, OutboundFrame},
    error::MessagePushError,
    value_object::ConnectionId,
};

/// Outcome of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of recipients the frame was enqueued for
    pub delivered: usize,
    /// Recipients whose queue was full or already closed; they must be unregistered
    pub failed: Vec<ConnectionId>,
    /// Recipients that were no longer in the connection table
    pub missing: usize,
}

/// Global connection table.
///
/// Only the hub's control loop registers and unregisters; anybody may push.
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// Fails with [`MessagePushError::DuplicateClient`] if the id is already live.
    async fn register_client(&self, handle: ConnectionHandle) -> Result<(), MessagePushError>;

    /// Remove `handle` if it is still the live connection for its id.
    ///
    /// Returns `false` when the id is gone or now belongs to a newer connection, which
    /// is left untouched.
    async fn unregister_client(&self, handle: &ConnectionHandle) -> bool;

    /// Handle currently registered under `connection_id`.
    async fn client(&self, connection_id: &ConnectionId) -> Option<ConnectionHandle>;

    async fn is_registered(&self, connection_id: &ConnectionId) -> bool;

    /// Non-blocking enqueue to one connection.
    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        frame: OutboundFrame,
    ) -> Result<(), MessagePushError>;

    /// Non-blocking enqueue to every target.
    async fn broadcast(&self, targets: &[ConnectionId], frame: OutboundFrame) -> BroadcastReport;

    async fn connection_count(&self) -> usize;
}
