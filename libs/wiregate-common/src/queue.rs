//! Per-instance durable topic contract.
//!
//! Each gateway instance exclusively consumes the topic named after its
//! own instance identifier. The client library's batching/retry
//! machinery is external; this module only defines the publishing and
//! subscription surface plus an in-process implementation for
//! single-node development and tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::envelope::Envelope;

/// Per-topic buffer cap, matching the capped stream length of the
/// production queue. Oldest entries are dropped past this point.
const TOPIC_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("topic {0} is at capacity")]
    Full(String),
    #[error("queue backend unavailable: {0}")]
    Backend(String),
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), QueueError>;

    /// Attach the (single) consumer for a topic. Messages published
    /// while no consumer was attached are delivered first, in order.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Envelope>, QueueError>;
}

// ---------------------------------------------------------------------------
// In-process implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TopicState {
    buffered: VecDeque<Envelope>,
    sender: Option<mpsc::Sender<Envelope>>,
}

/// In-process queue preserving per-topic FIFO order. Survives a
/// transiently absent consumer by buffering, mirroring how a durable
/// topic holds messages while its instance is down.
#[derive(Default)]
pub struct MemoryQueue {
    topics: Mutex<HashMap<String, TopicState>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), QueueError> {
        let mut topics = self.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();

        if let Some(sender) = &state.sender {
            match sender.try_send(envelope.clone()) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    return Err(QueueError::Full(topic.to_string()));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Consumer went away; fall back to buffering for the next one.
                    state.sender = None;
                }
            }
        }

        if state.buffered.len() >= TOPIC_BUFFER {
            state.buffered.pop_front();
            tracing::warn!(topic, "topic buffer full, dropped oldest message");
        }
        state.buffered.push_back(envelope.clone());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Envelope>, QueueError> {
        let mut topics = self.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();

        let (sender, receiver) = mpsc::channel(TOPIC_BUFFER);
        for envelope in state.buffered.drain(..) {
            // Capacity equals the buffer cap, so this cannot overflow.
            let _ = sender.try_send(envelope);
        }
        state.sender = Some(sender);
        Ok(receiver)
    }
}
