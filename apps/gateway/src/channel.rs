//! Connection handle: the send side of one live client socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// Outbound queue at capacity; the peer is a slow or dead consumer.
    #[error("outbound queue full")]
    Full,
    #[error("connection closed")]
    Closed,
}

/// Shared handle for one client connection.
///
/// Owned by the session that created it; the registry and any room hold
/// non-owning references. The write pump holds the receiving end of the
/// outbound queue.
pub struct Channel {
    pub user_id: i64,
    pub room_id: i64,
    outbound: mpsc::Sender<String>,
    last_activity: Mutex<Instant>,
    closed: AtomicBool,
    closed_notify: Notify,
}

impl Channel {
    /// Create a handle and the receiver its write pump will drain.
    pub fn new(user_id: i64, room_id: i64, capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let channel = Arc::new(Self {
            user_id,
            room_id,
            outbound,
            last_activity: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
        });
        (channel, rx)
    }

    /// Non-blocking enqueue of an outbound frame. Never waits on a slow
    /// consumer; a full queue is the caller's signal to drop the peer.
    pub fn try_push(&self, frame: String) -> Result<(), PushError> {
        if self.is_closed() {
            return Err(PushError::Closed);
        }
        self.outbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Flag the connection closed and wake its pumps. Idempotent and
    /// safe to race from the read, write, and heartbeat loops; returns
    /// whether this call performed the transition.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed_notify.notify_waiters();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve once the connection has been closed.
    pub async fn closed(&self) {
        let notified = self.closed_notify.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    /// Record inbound activity for the heartbeat loop.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}
