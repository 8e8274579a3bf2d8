//! WebSocket connection handlers.
//!
//! 1 接続につき 2 つのタスクを動かします。
//!
//! - read pump: ソケットからフレームを読み、ルーターへ渡す（読み取り期限付き）
//! - write pump: 送信キューを書き出し、アイドル時に ping を送る（書き込み期限付き）
//!
//! どちらかが終了したらもう片方を止め、Hub から登録解除します（登録解除は冪等）。
//! 登録解除はこの接続のハンドルを指定するので、同じ ID で再接続した新しい接続には影響しません。

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{
    sink::{Sink, SinkExt},
    stream::{SplitSink, SplitStream, StreamExt},
};
use tokio::time::Instant;

use crate::{
    domain::{
        ConnectionHandle, ConnectionId, ErrorCode, OutboundFrame, OutboundReceiver, ServerEvent,
        SocketMessage,
    },
    ui::{
        identity::AuthenticatedUser,
        state::{AppState, ConnectionConfig},
    },
    usecase::{DisconnectReason, HubError},
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = user.into_id();

    if state.hub.is_connected(&user_id).await {
        tracing::warn!(
            "Client with ID '{}' is already connected. Rejecting connection.",
            user_id
        );
        return Err(StatusCode::CONFLICT);
    }

    let max_message_size = state.connection.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    user_id: ConnectionId,
) {
    let (handle, rx) = ConnectionHandle::new(
        user_id.clone(),
        state.hub.now(),
        state.connection.outbound_capacity,
    );
    let (mut sender, receiver) = socket.split();

    // 登録の確定は Hub の制御ループで行う（アップグレード前のチェックとは競合しうる）
    if let Err(e) = state.hub.register(handle.clone()).await {
        tracing::warn!("Rejecting connection '{}': {}", user_id, e);
        reject_duplicate(&mut sender, &state, &e).await;
        return;
    }

    let mut read_task = tokio::spawn(read_pump(receiver, handle.clone(), state.clone()));
    let mut write_task = tokio::spawn(write_pump(
        sender,
        rx,
        handle.clone(),
        state.connection.clone(),
    ));

    // If any one of the tasks completes, abort the other
    let reason = tokio::select! {
        reason = &mut read_task => {
            write_task.abort();
            reason.unwrap_or(DisconnectReason::TransportError)
        }
        reason = &mut write_task => {
            read_task.abort();
            reason.unwrap_or(DisconnectReason::TransportError)
        }
    };

    state.hub.unregister(&handle, reason).await;
    tracing::debug!("Connection '{}' finished ({})", user_id, reason);
}

/// Tell a socket that lost the registration race why it is being closed.
async fn reject_duplicate(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    error: &HubError,
) {
    let event = ServerEvent::Error {
        room_id: None,
        code: ErrorCode::DuplicateConnection,
        message: error.to_string(),
    };
    let message = SocketMessage::from_server(event, state.hub.now());
    match state.codec.encode(&message) {
        Ok(frame) => {
            let _ = sender.send(Message::Text(frame.to_string().into())).await;
        }
        Err(e) => tracing::error!("Failed to encode rejection: {}", e),
    }
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Utf8Bytes::from_static("duplicate connection"),
        })))
        .await;
}

/// Read frames until the peer goes away, the read deadline passes, or a transport error.
async fn read_pump(
    mut receiver: SplitStream<WebSocket>,
    handle: ConnectionHandle,
    state: Arc<AppState>,
) -> DisconnectReason {
    let user_id = handle.id().clone();
    let pong_wait = state.connection.pong_wait;

    loop {
        let message = match tokio::time::timeout(pong_wait, receiver.next()).await {
            Err(_) => {
                tracing::info!(
                    "No traffic from '{}' within {:?} (last activity at {}); closing",
                    user_id,
                    pong_wait,
                    handle.last_activity().value()
                );
                return DisconnectReason::Timeout;
            }
            Ok(None) => return DisconnectReason::ClientClosed,
            Ok(Some(Err(e))) => {
                // 1006 相当（クローズフレームなしの切断）はエラー扱いにしない
                tracing::debug!("WebSocket read error from '{}': {}", user_id, e);
                return DisconnectReason::TransportError;
            }
            Ok(Some(Ok(message))) => message,
        };
        handle.touch(state.hub.now());

        match message {
            Message::Text(text) => {
                // Client-visible failures are already reported back by the router
                let _ = state
                    .route_message_usecase
                    .execute(&user_id, text.as_str())
                    .await;
            }
            Message::Binary(_) => {
                let event = ServerEvent::Error {
                    room_id: None,
                    code: ErrorCode::UnsupportedType,
                    message: "binary frames are not supported".to_string(),
                };
                let reply = SocketMessage::from_server(event, state.hub.now());
                if let Err(e) = state.hub.send_to(&user_id, &reply).await {
                    tracing::debug!("Failed to reject binary frame from '{}': {}", user_id, e);
                }
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Pong replies are sent by the protocol layer; both only refresh the deadline
            }
            Message::Close(frame) => {
                log_close(&user_id, frame.as_ref());
                return DisconnectReason::ClientClosed;
            }
        }
    }
}

fn log_close(user_id: &ConnectionId, frame: Option<&CloseFrame>) {
    match frame {
        Some(frame) if frame.code == close_code::AWAY || frame.code == close_code::ABNORMAL => {
            tracing::debug!("Client '{}' went away (code {})", user_id, frame.code);
        }
        Some(frame) => tracing::info!(
            "Client '{}' requested close (code {}, reason '{}')",
            user_id,
            frame.code,
            frame.reason.as_str()
        ),
        None => tracing::info!("Client '{}' requested close", user_id),
    }
}

/// Drain the outbound queue into the socket, pinging while idle.
async fn write_pump(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: OutboundReceiver,
    handle: ConnectionHandle,
    config: ConnectionConfig,
) -> DisconnectReason {
    let user_id = handle.id().clone();
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );

    loop {
        tokio::select! {
            biased;

            _ = handle.closed() => {
                tracing::debug!("Connection '{}' closed by the hub", user_id);
                let close = Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: Utf8Bytes::from_static("outbound queue overflow"),
                }));
                // The peer is already being dropped; a failed close frame changes nothing
                let _ = write_within(&user_id, config.write_wait, sender.send(close)).await;
                return DisconnectReason::SlowConsumer;
            }

            frame = rx.recv() => {
                let Some(frame) = frame else {
                    return DisconnectReason::ClientClosed;
                };
                let batch = write_batch(&mut sender, &mut rx, frame);
                if let Err(reason) = write_within(&user_id, config.write_wait, batch).await {
                    return reason;
                }
                ping.reset();
            }

            _ = ping.tick() => {
                let ping_frame = sender.send(Message::Ping(Default::default()));
                if let Err(reason) = write_within(&user_id, config.write_wait, ping_frame).await {
                    return reason;
                }
            }
        }
    }
}

/// Run one socket write under the write deadline.
async fn write_within<F, E>(
    user_id: &ConnectionId,
    write_wait: Duration,
    write: F,
) -> Result<(), DisconnectReason>
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(write_wait, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!("WebSocket write error to '{}': {}", user_id, e);
            Err(DisconnectReason::TransportError)
        }
        Err(_) => {
            tracing::info!(
                "Write to '{}' did not finish within {:?}; closing",
                user_id,
                write_wait
            );
            Err(DisconnectReason::Timeout)
        }
    }
}

/// Feed `first` and everything already queued behind it, then flush once.
async fn write_batch<S>(
    sender: &mut S,
    rx: &mut OutboundReceiver,
    first: OutboundFrame,
) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    sender.feed(Message::Text(first.to_string().into())).await?;
    while let Ok(frame) = rx.try_recv() {
        sender.feed(Message::Text(frame.to_string().into())).await?;
    }
    sender.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use std::{
        convert::Infallible,
        pin::Pin,
        task::{Context, Poll},
    };

    /// Sink that records what was written and how often it was flushed.
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Message>,
        flushes: usize,
    }

    impl Sink<Message> for RecordingSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.get_mut().sent.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.get_mut().flushes += 1;
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Sink whose peer never reads: it is never ready for another frame.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    fn alice() -> ConnectionId {
        ConnectionId::new("alice".to_string()).unwrap()
    }

    fn queue(frames: &[&str]) -> OutboundReceiver {
        let (handle, rx) = ConnectionHandle::new(alice(), Timestamp::new(0), 8);
        for frame in frames {
            handle.try_push(Arc::from(*frame)).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_write_batch_flushes_queued_frames_once() {
        // テスト項目: キューに溜まったフレームはまとめて書き込まれ、flush は 1 回だけ
        // given (前提条件):
        let mut sink = RecordingSink::default();
        let mut rx = queue(&["second", "third"]);

        // when (操作):
        write_batch(&mut sink, &mut rx, Arc::from("first"))
            .await
            .unwrap();

        // then (期待する結果):
        let texts: Vec<String> = sink
            .sent
            .iter()
            .map(|message| match message {
                Message::Text(text) => text.as_str().to_string(),
                other => panic!("unexpected frame: {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(sink.flushes, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_within_times_out_on_stalled_peer() {
        // テスト項目: 読まない相手への書き込みは書き込み期限で打ち切られる
        // given (前提条件):
        let mut sink = StalledSink;
        let mut rx = queue(&[]);

        // when (操作):
        let batch = write_batch(&mut sink, &mut rx, Arc::from("stuck"));
        let result = write_within(&alice(), Duration::from_millis(50), batch).await;

        // then (期待する結果):
        assert_eq!(result, Err(DisconnectReason::Timeout));
    }

    #[tokio::test]
    async fn test_write_within_maps_write_error_to_transport_error() {
        // テスト項目: 書き込みエラーは TransportError として扱われる
        // given (前提条件):
        let failing = async { Err::<(), _>("connection reset") };

        // when (操作):
        let result = write_within(&alice(), Duration::from_secs(1), failing).await;

        // then (期待する結果):
        assert_eq!(result, Err(DisconnectReason::TransportError));
    }
}
