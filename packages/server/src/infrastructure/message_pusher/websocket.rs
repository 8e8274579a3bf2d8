//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続テーブル（接続 ID → `ConnectionHandle`）の管理
//! - 送信キューへのノンブロッキングな書き込み（push_to, broadcast）
//!
//! ## 設計ノート
//!
//! ソケット自体は UI 層の read / write ポンプが所有します。
//! ここで保持するのは送信キューの送信側と close シグナルだけです。
//! テーブルの書き込みロックはキュー操作の間は保持しません。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{
    BroadcastReport, ConnectionHandle, ConnectionId, MessagePushError, MessagePusher,
    OutboundFrame,
};

/// WebSocket を使った MessagePusher 実装
#[derive(Debug, Default)]
pub struct WebSocketMessagePusher {
    /// 接続中のクライアント
    clients: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(&self, handle: ConnectionHandle) -> Result<(), MessagePushError> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(handle.id()) {
            return Err(MessagePushError::DuplicateClient(handle.id().to_string()));
        }
        tracing::debug!("Client '{}' registered to MessagePusher", handle.id());
        clients.insert(handle.id().clone(), handle);
        Ok(())
    }

    async fn unregister_client(&self, handle: &ConnectionHandle) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get(handle.id()) {
            Some(stored) if stored.same_connection(handle) => {
                clients.remove(handle.id());
                tracing::debug!("Client '{}' unregistered from MessagePusher", handle.id());
                true
            }
            Some(_) => {
                // 同じ ID で再接続済み：古い接続の後始末で新しい接続を消さない
                tracing::debug!(
                    "Client '{}' has reconnected; keeping the newer connection",
                    handle.id()
                );
                false
            }
            None => false,
        }
    }

    async fn client(&self, connection_id: &ConnectionId) -> Option<ConnectionHandle> {
        self.clients.read().await.get(connection_id).cloned()
    }

    async fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.clients.read().await.contains_key(connection_id)
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        frame: OutboundFrame,
    ) -> Result<(), MessagePushError> {
        let handle = self
            .client(connection_id)
            .await
            .ok_or_else(|| MessagePushError::ClientNotFound(connection_id.to_string()))?;
        handle.try_push(frame)?;
        tracing::trace!("Pushed message to client '{}'", connection_id);
        Ok(())
    }

    async fn broadcast(&self, targets: &[ConnectionId], frame: OutboundFrame) -> BroadcastReport {
        let handles: Vec<(ConnectionId, Option<ConnectionHandle>)> = {
            let clients = self.clients.read().await;
            targets
                .iter()
                .map(|id| (id.clone(), clients.get(id).cloned()))
                .collect()
        };

        let mut report = BroadcastReport::default();
        for (id, handle) in handles {
            let Some(handle) = handle else {
                // ブロードキャストでは一部の送信先の欠落を許容
                tracing::debug!("Client '{}' not found during broadcast, skipping", id);
                report.missing += 1;
                continue;
            };
            match handle.try_push(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Failed to push message to client '{}': {}", id, e);
                    report.failed.push(id);
                }
            }
        }
        report
    }

    async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutboundReceiver, Timestamp};
    use std::sync::Arc;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - 接続テーブルへの登録・登録解除（重複登録の拒否を含む）
    // - push_to: 特定の接続への送信
    // - broadcast: 複数接続への送信と、満杯キューの検出
    // ========================================

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id.to_string()).unwrap()
    }

    fn handle(id: &str, capacity: usize) -> (ConnectionHandle, OutboundReceiver) {
        ConnectionHandle::new(conn(id), Timestamp::new(0), capacity)
    }

    fn frame(text: &str) -> OutboundFrame {
        Arc::from(text)
    }

    #[tokio::test]
    async fn test_register_duplicate_is_rejected() {
        // テスト項目: 同じ ID の二重登録は拒否される
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (first, _rx1) = handle("alice", 4);
        let (second, _rx2) = handle("alice", 4);
        pusher.register_client(first).await.unwrap();

        // when (操作):
        let result = pusher.register_client(second).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(MessagePushError::DuplicateClient("alice".to_string()))
        );
        assert_eq!(pusher.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_twice_returns_false_second_time() {
        // テスト項目: 登録解除は 1 回目だけ true を返す
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (alice, _rx) = handle("alice", 4);
        pusher.register_client(alice.clone()).await.unwrap();

        // when (操作):
        let first = pusher.unregister_client(&alice).await;
        let second = pusher.unregister_client(&alice).await;

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert!(!pusher.is_registered(&conn("alice")).await);
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_unregister_reconnected_client() {
        // テスト項目: 古い接続のハンドルでは、同じ ID で再接続した新しい接続を削除できない
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (old, _rx_old) = handle("alice", 4);
        let (new, _rx_new) = handle("alice", 4);
        pusher.register_client(old.clone()).await.unwrap();
        assert!(pusher.unregister_client(&old).await);
        pusher.register_client(new.clone()).await.unwrap();

        // when (操作):
        let removed = pusher.unregister_client(&old).await;

        // then (期待する結果):
        assert!(!removed);
        let stored = pusher.client(&conn("alice")).await.unwrap();
        assert!(stored.same_connection(&new));
    }

    #[tokio::test]
    async fn test_push_to_success() {
        // テスト項目: 特定の接続にメッセージを送信できる
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (alice, mut rx) = handle("alice", 4);
        pusher.register_client(alice).await.unwrap();

        // when (操作):
        let result = pusher.push_to(&conn("alice"), frame("Hello")).await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(rx.recv().await.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_push_to_client_not_found() {
        // テスト項目: 存在しない接続への送信はエラーを返す
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();

        // when (操作):
        let result = pusher.push_to(&conn("nobody"), frame("Hello")).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(MessagePushError::ClientNotFound("nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn test_broadcast_reports_full_queue() {
        // テスト項目: キューが満杯の接続は failed として報告され、他の接続には届く
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (alice, mut rx_alice) = handle("alice", 4);
        let (bob, _rx_bob) = handle("bob", 1);
        pusher.register_client(alice).await.unwrap();
        pusher.register_client(bob).await.unwrap();
        pusher.push_to(&conn("bob"), frame("fill")).await.unwrap();

        // when (操作):
        let report = pusher
            .broadcast(&[conn("alice"), conn("bob"), conn("ghost")], frame("news"))
            .await;

        // then (期待する結果):
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![conn("bob")]);
        assert_eq!(report.missing, 1);
        assert_eq!(rx_alice.recv().await.as_deref(), Some("news"));
    }

    #[tokio::test]
    async fn test_broadcast_empty_targets() {
        // テスト項目: 空のターゲットリストでもエラーにならない
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();

        // when (操作):
        let report = pusher.broadcast(&[], frame("Message")).await;

        // then (期待する結果):
        assert_eq!(report, BroadcastReport::default());
    }
}
