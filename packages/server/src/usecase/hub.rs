//! Hub: 接続とルームの調停役
//!
//! ## 概要
//!
//! - 接続テーブルへの登録・登録解除は単一の制御ループ（single writer）で直列化する
//! - ルーム単位のブロードキャストは呼び出し元のタスクで実行する（ノンブロッキング）
//! - 送信キューが満杯の接続は、ブロードキャストのループが終わった後で登録解除する
//!
//! ## 状態遷移
//!
//! ```text
//! Connecting → Registered → (Joined to 0..n rooms) → Unregistering → Closed
//! ```
//!
//! 登録解除は冪等です。2 回目以降の要求は「既に削除済み」として何もしません。

use std::{collections::VecDeque, sync::Arc, time::Duration};

use irori_shared::time::Clock;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::domain::{
    BroadcastReport, CollaboratorError, ConnectionHandle, ConnectionId, JoinOutcome, LeaveOutcome,
    MembershipAuthority, MessageCodec, MessagePushError, MessagePusher, Participant, RoomId,
    RoomPresence, RoomRegistry, ServerEvent, SocketMessage, Timestamp,
};

use super::error::HubError;

/// Hub behaviour knobs.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Consult the membership authority before accepting a join
    pub verify_membership: bool,
    /// Upper bound on one membership lookup
    pub collaborator_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            verify_membership: false,
            collaborator_timeout: Duration::from_secs(2),
        }
    }
}

/// Everything the hub is wired to.
pub struct HubDependencies {
    pub pusher: Arc<dyn MessagePusher>,
    pub registry: Arc<dyn RoomRegistry>,
    pub membership: Arc<dyn MembershipAuthority>,
    pub codec: Arc<dyn MessageCodec>,
    pub clock: Arc<dyn Clock>,
}

/// Why a connection is being unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a close frame or the stream ended
    ClientClosed,
    /// Read or write on the transport failed
    TransportError,
    /// Nothing was read within the read deadline
    Timeout,
    /// The outbound queue was full
    SlowConsumer,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::ClientClosed => "client closed",
            Self::TransportError => "transport error",
            Self::Timeout => "read deadline exceeded",
            Self::SlowConsumer => "outbound queue full",
        };
        f.write_str(reason)
    }
}

/// Result of [`Hub::join_room_with_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinResponse {
    /// New presence; the room was told about it
    Joined,
    /// Already present; only the acknowledgment was re-sent
    AlreadyMember,
    /// The membership authority refused; the joiner got `JOIN_ERROR`
    Rejected,
}

/// Which connection an unregister request is about.
///
/// A connection id is reused by reconnects, so requests never act on the id alone.
enum UnregisterTarget {
    /// Exactly this connection; a newer connection with the same id is left alone
    Session(ConnectionHandle),
    /// Whatever is registered under the id, but only once its queue has overflowed
    Overflowed(ConnectionId),
}

enum HubCommand {
    Register {
        handle: ConnectionHandle,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister {
        target: UnregisterTarget,
        reason: DisconnectReason,
        reply: oneshot::Sender<bool>,
    },
}

struct HubCore {
    pusher: Arc<dyn MessagePusher>,
    registry: Arc<dyn RoomRegistry>,
    membership: Arc<dyn MembershipAuthority>,
    codec: Arc<dyn MessageCodec>,
    clock: Arc<dyn Clock>,
    config: HubConfig,
}

impl HubCore {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    async fn register(&self, handle: ConnectionHandle) -> Result<(), HubError> {
        let id = handle.id().clone();
        self.pusher
            .register_client(handle)
            .await
            .map_err(|_| HubError::DuplicateConnection(id.to_string()))?;
        tracing::info!(
            "Client '{}' registered ({} live connections)",
            id,
            self.pusher.connection_count().await
        );
        Ok(())
    }

    /// Unregister one connection plus every connection whose queue overflowed while the
    /// departure was being announced. Runs inside the control loop only.
    async fn unregister_cascade(&self, target: UnregisterTarget, reason: DisconnectReason) -> bool {
        let mut pending = VecDeque::from([(target, reason)]);
        let mut first = None;
        while let Some((target, reason)) = pending.pop_front() {
            let (removed, failed) = self.cleanup(target, reason).await;
            first.get_or_insert(removed);
            pending.extend(failed.into_iter().map(|id| {
                (
                    UnregisterTarget::Overflowed(id),
                    DisconnectReason::SlowConsumer,
                )
            }));
        }
        first.unwrap_or(false)
    }

    async fn resolve(&self, target: UnregisterTarget) -> Option<ConnectionHandle> {
        match target {
            UnregisterTarget::Session(handle) => Some(handle),
            // 溢れた接続は try_push の時点で閉じられている。閉じていなければ再接続後の新しい接続
            UnregisterTarget::Overflowed(id) => self
                .pusher
                .client(&id)
                .await
                .filter(ConnectionHandle::is_closed),
        }
    }

    async fn cleanup(
        &self,
        target: UnregisterTarget,
        reason: DisconnectReason,
    ) -> (bool, Vec<ConnectionId>) {
        let Some(handle) = self.resolve(target).await else {
            return (false, Vec::new());
        };
        let connection_id = handle.id();
        if !self.pusher.unregister_client(&handle).await {
            tracing::debug!("Connection '{}' already unregistered", connection_id);
            return (false, Vec::new());
        }
        handle.close();

        let mut failed = Vec::new();
        for room_id in self.registry.rooms_of(connection_id).await {
            match self.registry.leave(&room_id, connection_id).await {
                LeaveOutcome::Left { room_remains: true } => {
                    failed.extend(self.announce_departure(&room_id, connection_id).await);
                }
                LeaveOutcome::Left {
                    room_remains: false,
                } => tracing::debug!("Room '{}' closed with '{}'", room_id, connection_id),
                LeaveOutcome::NotMember => {}
            }
        }

        let now = self.now().value();
        tracing::info!(
            "Client '{}' unregistered ({}) after {} ms, idle {} ms; {} live connections remain",
            connection_id,
            reason,
            now - handle.connected_at().value(),
            now - handle.last_activity().value(),
            self.pusher.connection_count().await
        );
        (true, failed)
    }

    /// Tell a room that someone left and push the refreshed member list. Returns the
    /// recipients that could not take the messages.
    async fn announce_departure(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
    ) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        let left = SocketMessage::from_server(
            ServerEvent::UserLeft {
                room_id: room_id.clone(),
                user_id: connection_id.clone(),
            },
            self.now(),
        );
        match self.fan_out(room_id, &left, None).await {
            Ok(report) => failed.extend(report.failed),
            Err(e) => tracing::error!("Failed to broadcast USER_LEFT to '{}': {}", room_id, e),
        }
        match self.push_member_list(room_id).await {
            Ok(report) => failed.extend(report.failed),
            Err(e) => tracing::error!("Failed to broadcast USERS to '{}': {}", room_id, e),
        }
        failed
    }

    async fn push_member_list(&self, room_id: &RoomId) -> Result<BroadcastReport, HubError> {
        let users = self.registry.members(room_id).await;
        let message = SocketMessage::from_server(
            ServerEvent::Users {
                room_id: room_id.clone(),
                users,
            },
            self.now(),
        );
        self.fan_out(room_id, &message, None).await
    }

    /// Serialize once, snapshot the room, enqueue to every member without blocking.
    async fn fan_out(
        &self,
        room_id: &RoomId,
        message: &SocketMessage,
        exclude: Option<&ConnectionId>,
    ) -> Result<BroadcastReport, HubError> {
        let frame = self.codec.encode(message)?;
        let targets: Vec<ConnectionId> = self
            .registry
            .members(room_id)
            .await
            .into_iter()
            .map(|participant| participant.id)
            .filter(|id| Some(id) != exclude)
            .collect();
        if targets.is_empty() {
            return Ok(BroadcastReport::default());
        }
        Ok(self.pusher.broadcast(&targets, frame).await)
    }

    /// `None` when the authority could not answer in time or failed.
    async fn check_membership(&self, user_id: &ConnectionId, room_id: &RoomId) -> Option<bool> {
        let timeout = self.config.collaborator_timeout;
        let lookup = self.membership.is_user_member_of_chat_room(user_id, room_id);
        let result = tokio::time::timeout(timeout, lookup)
            .await
            .unwrap_or_else(|_| {
                Err(CollaboratorError::Timeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                ))
            });
        match result {
            Ok(is_member) => Some(is_member),
            Err(e) => {
                tracing::warn!(
                    "Membership lookup for '{}' in '{}' failed, allowing join: {}",
                    user_id,
                    room_id,
                    e
                );
                None
            }
        }
    }
}

async fn run_control_loop(core: Arc<HubCore>, mut commands: mpsc::UnboundedReceiver<HubCommand>) {
    tracing::info!("Hub control loop started");
    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register { handle, reply } => {
                let result = core.register(handle).await;
                // The requester may have given up; registration stands either way
                let _ = reply.send(result);
            }
            HubCommand::Unregister {
                target,
                reason,
                reply,
            } => {
                let removed = core.unregister_cascade(target, reason).await;
                let _ = reply.send(removed);
            }
        }
    }
    tracing::info!("Hub control loop stopped");
}

/// Handle to the hub. Cheap to clone; the control loop stops once every clone is gone.
#[derive(Clone)]
pub struct Hub {
    core: Arc<HubCore>,
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl Hub {
    /// Start the control loop and return a handle to it.
    pub fn spawn(dependencies: HubDependencies, config: HubConfig) -> (Self, JoinHandle<()>) {
        let core = Arc::new(HubCore {
            pusher: dependencies.pusher,
            registry: dependencies.registry,
            membership: dependencies.membership,
            codec: dependencies.codec,
            clock: dependencies.clock,
            config,
        });
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_control_loop(core.clone(), receiver));
        (Self { core, commands }, task)
    }

    /// Current server time as seen by the hub.
    pub fn now(&self) -> Timestamp {
        self.core.now()
    }

    /// Add a connection to the global table. Emits no broadcast.
    pub async fn register(&self, handle: ConnectionHandle) -> Result<(), HubError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(HubCommand::Register { handle, reply })
            .map_err(|_| HubError::Stopped)?;
        response.await.map_err(|_| HubError::Stopped)?
    }

    /// Remove this connection everywhere and wait for the cleanup to finish.
    ///
    /// Returns `true` only for the call that actually removed it. A newer connection
    /// that reuses the same id is not affected.
    pub async fn unregister(&self, handle: &ConnectionHandle, reason: DisconnectReason) -> bool {
        self.request(UnregisterTarget::Session(handle.clone()), reason)
            .await
    }

    async fn request(&self, target: UnregisterTarget, reason: DisconnectReason) -> bool {
        let (reply, response) = oneshot::channel();
        let command = HubCommand::Unregister {
            target,
            reason,
            reply,
        };
        if self.commands.send(command).is_err() {
            tracing::warn!("Hub stopped; dropping unregister request");
            return false;
        }
        response.await.unwrap_or(false)
    }

    pub async fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.core.pusher.is_registered(connection_id).await
    }

    pub async fn connection_count(&self) -> usize {
        self.core.pusher.connection_count().await
    }

    pub async fn is_member(&self, room_id: &RoomId, connection_id: &ConnectionId) -> bool {
        self.core.registry.is_member(room_id, connection_id).await
    }

    pub async fn members(&self, room_id: &RoomId) -> Vec<Participant> {
        self.core.registry.members(room_id).await
    }

    pub async fn rooms(&self) -> Vec<RoomPresence> {
        self.core.registry.rooms().await
    }

    pub async fn contains_room(&self, room_id: &RoomId) -> bool {
        self.core.registry.contains_room(room_id).await
    }

    /// Send one envelope to one connection.
    ///
    /// An unresponsive recipient is unregistered before this returns.
    pub async fn send_to(
        &self,
        connection_id: &ConnectionId,
        message: &SocketMessage,
    ) -> Result<(), HubError> {
        let frame = self.core.codec.encode(message)?;
        match self.core.pusher.push_to(connection_id, frame).await {
            Ok(()) => Ok(()),
            Err(e @ (MessagePushError::QueueFull(_) | MessagePushError::Closed(_))) => {
                self.evict(std::slice::from_ref(connection_id)).await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fan a message out to the room's current members.
    ///
    /// Members whose queue is full are unregistered after the fan-out completes, and
    /// before this returns.
    pub async fn broadcast_to_room(
        &self,
        room_id: &RoomId,
        message: &SocketMessage,
    ) -> Result<BroadcastReport, HubError> {
        let report = self.core.fan_out(room_id, message, None).await?;
        self.evict(&report.failed).await;
        tracing::debug!(
            "Broadcast to '{}': delivered={}, failed={}",
            room_id,
            report.delivered,
            report.failed.len()
        );
        Ok(report)
    }

    /// Join a room, acknowledge to the joiner, and announce a new presence.
    ///
    /// The acknowledgment always goes out before the `USER_JOINED` / `USERS`
    /// broadcasts. A repeated join only re-sends the acknowledgment.
    pub async fn join_room_with_response(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
    ) -> Result<JoinResponse, HubError> {
        if !self.is_connected(connection_id).await {
            return Err(HubError::NotRegistered(connection_id.to_string()));
        }

        if self.core.config.verify_membership
            && self.core.check_membership(connection_id, room_id).await == Some(false)
        {
            tracing::info!(
                "Client '{}' is not a member of chat room '{}'; join rejected",
                connection_id,
                room_id
            );
            let rejection = SocketMessage::from_server(
                ServerEvent::JoinError {
                    room_id: room_id.clone(),
                    reason: format!("not a member of chat room '{}'", room_id),
                },
                self.now(),
            );
            self.send_to(connection_id, &rejection).await?;
            return Ok(JoinResponse::Rejected);
        }

        let outcome = self
            .core
            .registry
            .join(room_id, connection_id, self.now())
            .await;

        // Lost a race with unregistration: undo so no presence outlives its connection
        if !self.is_connected(connection_id).await {
            if outcome == JoinOutcome::Joined {
                self.core.registry.leave(room_id, connection_id).await;
            }
            return Err(HubError::NotRegistered(connection_id.to_string()));
        }

        let acknowledgment = SocketMessage::from_server(
            ServerEvent::JoinSuccess {
                room_id: room_id.clone(),
                users: self.core.registry.members(room_id).await,
            },
            self.now(),
        );
        self.send_to(connection_id, &acknowledgment).await?;

        if outcome == JoinOutcome::AlreadyMember {
            tracing::debug!(
                "Client '{}' already present in '{}'; acknowledgment re-sent",
                connection_id,
                room_id
            );
            return Ok(JoinResponse::AlreadyMember);
        }

        tracing::info!("Client '{}' joined room '{}'", connection_id, room_id);

        let joined = SocketMessage::from_server(
            ServerEvent::UserJoined {
                room_id: room_id.clone(),
                user_id: connection_id.clone(),
            },
            self.now(),
        );
        let report = self
            .core
            .fan_out(room_id, &joined, Some(connection_id))
            .await?;
        self.evict(&report.failed).await;

        let report = self.core.push_member_list(room_id).await?;
        self.evict(&report.failed).await;

        Ok(JoinResponse::Joined)
    }

    /// Leave a room and tell whoever is left.
    pub async fn leave_room(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
    ) -> Result<LeaveOutcome, HubError> {
        let outcome = self.core.registry.leave(room_id, connection_id).await;
        match outcome {
            LeaveOutcome::NotMember => {
                tracing::debug!(
                    "Client '{}' left room '{}' without being present",
                    connection_id,
                    room_id
                );
            }
            LeaveOutcome::Left { room_remains: true } => {
                tracing::info!("Client '{}' left room '{}'", connection_id, room_id);
                let failed = self.core.announce_departure(room_id, connection_id).await;
                self.evict(&failed).await;
            }
            LeaveOutcome::Left {
                room_remains: false,
            } => {
                tracing::info!(
                    "Client '{}' left room '{}'; room closed",
                    connection_id,
                    room_id
                );
            }
        }
        Ok(outcome)
    }

    async fn evict(&self, failed: &[ConnectionId]) {
        for id in failed {
            self.request(
                UnregisterTarget::Overflowed(id.clone()),
                DisconnectReason::SlowConsumer,
            )
            .await;
        }
    }
}
