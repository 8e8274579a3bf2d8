//! UseCase: チャットメッセージの永続化
//!
//! 永続化は配信の経路から切り離し、専用のワーカータスクで非同期に実行します。
//! キューが満杯のときはメッセージを破棄して警告ログを出します（配信は止めない）。

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::domain::{ChatMessage, MessageStore};

/// Hands chat messages to the store without ever blocking the caller.
#[derive(Clone)]
pub struct PersistenceDispatcher {
    queue: mpsc::Sender<ChatMessage>,
}

impl PersistenceDispatcher {
    /// Start the worker that drains the queue into `store`.
    ///
    /// The worker exits once every dispatcher clone has been dropped and the queue is
    /// empty.
    pub fn spawn(store: Arc<dyn MessageStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::channel::<ChatMessage>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let id = message.id.clone();
                let room_id = message.room_id.clone();
                match store.save_message(message).await {
                    Ok(()) => tracing::debug!("Persisted message '{}' in '{}'", id, room_id),
                    Err(e) => tracing::error!(
                        "Failed to persist message '{}' in '{}': {}",
                        id,
                        room_id,
                        e
                    ),
                }
            }
            tracing::debug!("Persistence worker stopped");
        });
        (Self { queue }, worker)
    }

    /// Queue a message for persistence. Returns `false` when it had to be dropped.
    pub fn dispatch(&self, message: ChatMessage) -> bool {
        match self.queue.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(
                    "Persistence queue full; dropping message '{}' in '{}'",
                    message.id,
                    message.room_id
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                tracing::warn!(
                    "Persistence worker stopped; dropping message '{}'",
                    message.id
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CollaboratorError, ConnectionId, MessageContent, MessageIdFactory, RoomId, Timestamp,
        collaborator::MockMessageStore,
    };
    use std::time::Duration;
    use tokio::sync::mpsc as test_mpsc;

    fn create_message(text: &str) -> ChatMessage {
        ChatMessage {
            id: MessageIdFactory::generate(),
            room_id: RoomId::new("r1".to_string()).unwrap(),
            from: ConnectionId::new("alice".to_string()).unwrap(),
            content: MessageContent::new(text.to_string()).unwrap(),
            sent_at: Timestamp::new(1_000),
        }
    }

    #[tokio::test]
    async fn test_dispatched_message_reaches_store() {
        // テスト項目: dispatch したメッセージがストアに保存される
        // given (前提条件):
        let (saved_tx, mut saved_rx) = test_mpsc::unbounded_channel();
        let mut store = MockMessageStore::new();
        store.expect_save_message().times(1).returning(move |message| {
            let _ = saved_tx.send(message);
            Ok(())
        });
        let (dispatcher, _worker) = PersistenceDispatcher::spawn(Arc::new(store), 8);
        let message = create_message("hello");

        // when (操作):
        let accepted = dispatcher.dispatch(message.clone());

        // then (期待する結果):
        assert!(accepted);
        let saved = tokio::time::timeout(Duration::from_secs(1), saved_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved, message);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_worker() {
        // テスト項目: 保存に失敗してもワーカーは次のメッセージを処理する
        // given (前提条件):
        let (saved_tx, mut saved_rx) = test_mpsc::unbounded_channel();
        let mut store = MockMessageStore::new();
        let mut attempts = 0;
        store.expect_save_message().times(2).returning(move |message| {
            attempts += 1;
            let _ = saved_tx.send(message.content.into_string());
            if attempts == 1 {
                Err(CollaboratorError::Unavailable("disk full".to_string()))
            } else {
                Ok(())
            }
        });
        let (dispatcher, _worker) = PersistenceDispatcher::spawn(Arc::new(store), 8);

        // when (操作):
        dispatcher.dispatch(create_message("first"));
        dispatcher.dispatch(create_message("second"));

        // then (期待する結果):
        for expected in ["first", "second"] {
            let content = tokio::time::timeout(Duration::from_secs(1), saved_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(content, expected);
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_message() {
        // テスト項目: キューが満杯のとき dispatch は待たずに false を返す
        // given (前提条件):
        // current_thread ランタイムなので、await するまでワーカーは動かない
        let mut store = MockMessageStore::new();
        store.expect_save_message().returning(|_| Ok(()));
        let (dispatcher, _worker) = PersistenceDispatcher::spawn(Arc::new(store), 1);

        // when (操作):
        let first = dispatcher.dispatch(create_message("one"));
        let second = dispatcher.dispatch(create_message("two"));

        // then (期待する結果):
        assert!(first);
        assert!(!second);
    }
}
