//! Server-side handle of one live connection.
//!
//! The handle is what the hub stores in its connection table. The socket itself stays
//! with the pumps in the UI layer; the handle only exposes the bounded outbound queue
//! and the close signal that stops the write pump.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use tokio::sync::{Notify, mpsc};

use super::{
    error::MessagePushError,
    value_object::{ConnectionId, Timestamp},
};

/// One serialized envelope, shared between every recipient of a broadcast.
pub type OutboundFrame = Arc<str>;

/// Receiving end of a connection's outbound queue, drained by the write pump.
pub type OutboundReceiver = mpsc::Receiver<OutboundFrame>;

#[derive(Debug)]
struct ConnectionShared {
    id: ConnectionId,
    connected_at: Timestamp,
    sender: mpsc::Sender<OutboundFrame>,
    closed: AtomicBool,
    close_signal: Notify,
    last_activity: AtomicI64,
}

/// Cheaply cloneable handle to a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionShared>,
}

impl ConnectionHandle {
    /// Create a handle with an outbound queue of `capacity` slots.
    ///
    /// Returns the handle and the receiver the write pump drains.
    pub fn new(
        id: ConnectionId,
        connected_at: Timestamp,
        capacity: usize,
    ) -> (Self, OutboundReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Self {
            inner: Arc::new(ConnectionShared {
                id,
                connected_at,
                sender,
                closed: AtomicBool::new(false),
                close_signal: Notify::new(),
                last_activity: AtomicI64::new(connected_at.value()),
            }),
        };
        (handle, receiver)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    pub fn connected_at(&self) -> Timestamp {
        self.inner.connected_at
    }

    /// Whether both handles refer to the same connection, not merely the same id.
    ///
    /// An id is only unique among live connections; a reconnect reuses it.
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Enqueue a frame without waiting.
    ///
    /// A full queue marks the connection as unresponsive: it is closed on the spot, so
    /// no later producer can enqueue to it either.
    pub fn try_push(&self, frame: OutboundFrame) -> Result<(), MessagePushError> {
        if self.is_closed() {
            return Err(MessagePushError::Closed(self.inner.id.to_string()));
        }

        match self.inner.sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.close();
                Err(MessagePushError::QueueFull(self.inner.id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(MessagePushError::Closed(self.inner.id.to_string()))
            }
        }
    }

    /// Mark the connection closed and wake the write pump.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let first = !self.inner.closed.swap(true, Ordering::AcqRel);
        if first {
            self.inner.close_signal.notify_waiters();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolve once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let notified = self.inner.close_signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    /// Record inbound or outbound traffic.
    pub fn touch(&self, now: Timestamp) {
        self.inner
            .last_activity
            .fetch_max(now.value(), Ordering::AcqRel);
    }

    pub fn last_activity(&self) -> Timestamp {
        Timestamp::new(self.inner.last_activity.load(Ordering::Acquire))
    }
}
