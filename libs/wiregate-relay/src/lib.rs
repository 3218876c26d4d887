//! Backend-side outbound relay: decides, for a target user or room,
//! which gateway instance(s) to contact and via which delivery path.
//!
//! Two paths exist. The direct path resolves the instance's address and
//! calls its delivery RPC synchronously, for callers that want an
//! immediate delivered/not-connected result. The queue path publishes
//! the envelope to the instance's own durable topic and accepts
//! eventual, not immediate, failure visibility.
//!
//! Room delivery always fans out to every registered instance; each
//! instance filters to its own local members. A room broadcast is never
//! point-to-point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use wiregate_common::directory::{DirectoryError, InstanceDirectory, PresenceDirectory};
use wiregate_common::queue::{MessageQueue, QueueError};
use wiregate_common::{instance_topic, Envelope, PushReply, SnowflakeGenerator};

/// Deadline on direct-path calls so one unreachable instance cannot
/// stall a caller fanning out over many targets.
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("no address registered for instance {0}")]
    Unresolved(String),
    #[error("gateway {instance_id} unreachable: {source}")]
    Transport {
        instance_id: String,
        source: reqwest::Error,
    },
}

/// Result of a direct-path single-user delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    NotConnected,
}

/// Result of publishing on the queue path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Published to the target instance's topic.
    Enqueued,
    /// The user has no presence record; nothing was published.
    NotConnected,
}

/// Per-instance outcome summary of a room fan-out. Transport failures
/// against individual instances are logged and skipped, never fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct FanoutReport {
    /// Instances the fan-out attempted to reach.
    pub instances: usize,
    /// Instances that reported local delivery.
    pub delivered: usize,
}

pub struct Relay {
    presence: Arc<dyn PresenceDirectory>,
    instances: Arc<dyn InstanceDirectory>,
    queue: Arc<dyn MessageQueue>,
    http: reqwest::Client,
    rpc_timeout: Duration,
    seq: SnowflakeGenerator,
}

impl Relay {
    pub fn new(
        presence: Arc<dyn PresenceDirectory>,
        instances: Arc<dyn InstanceDirectory>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            presence,
            instances,
            queue,
            http: reqwest::Client::new(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            seq: SnowflakeGenerator::new(rand::random::<u16>() % 1024),
        }
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Direct path: presence lookup, then a synchronous call against the
    /// one instance that holds the user's connection.
    pub async fn push_to_user(
        &self,
        user_id: i64,
        body: &str,
    ) -> Result<DeliveryStatus, RelayError> {
        let Some(instance_id) = self.presence.get(user_id).await? else {
            return Ok(DeliveryStatus::NotConnected);
        };
        let Some(addr) = self.instances.resolve(&instance_id).await? else {
            return Err(RelayError::Unresolved(instance_id));
        };

        let envelope = Envelope::single(user_id, body, self.seq.generate());
        let reply = self.call(&instance_id, &addr, "push", &envelope).await?;
        if reply.delivered() {
            Ok(DeliveryStatus::Delivered)
        } else {
            tracing::debug!(user_id, %instance_id, msg = %reply.msg, "direct push miss");
            Ok(DeliveryStatus::NotConnected)
        }
    }

    /// Queue path: publish to the target instance's topic. Survives
    /// transient unavailability of the instance, but not the instance
    /// permanently disappearing with a stale presence record.
    pub async fn push_to_user_queued(
        &self,
        user_id: i64,
        body: &str,
    ) -> Result<QueueOutcome, RelayError> {
        let Some(instance_id) = self.presence.get(user_id).await? else {
            return Ok(QueueOutcome::NotConnected);
        };

        let mut envelope = Envelope::single(user_id, body, self.seq.generate());
        envelope.instance_id = instance_id.clone();
        self.queue
            .publish(&instance_topic(&instance_id), &envelope)
            .await?;
        Ok(QueueOutcome::Enqueued)
    }

    pub async fn push_to_room(&self, room_id: i64, body: &str) -> Result<FanoutReport, RelayError> {
        let envelope = Envelope::room(room_id, body, self.seq.generate());
        self.fan_out("push_room", &envelope).await
    }

    pub async fn push_room_count(
        &self,
        room_id: i64,
        count: i64,
    ) -> Result<FanoutReport, RelayError> {
        let envelope = Envelope::room_count(room_id, count, self.seq.generate());
        self.fan_out("push_room_count", &envelope).await
    }

    pub async fn push_room_info(
        &self,
        room_id: i64,
        info: HashMap<String, String>,
    ) -> Result<FanoutReport, RelayError> {
        let envelope = Envelope::room_info(room_id, info, self.seq.generate());
        self.fan_out("push_room_info", &envelope).await
    }

    /// Broadcast-to-all-instances, filter-locally: every registered
    /// instance is called; each delivers to its local room members only.
    async fn fan_out(&self, endpoint: &str, envelope: &Envelope) -> Result<FanoutReport, RelayError> {
        let fleet = self.instances.list().await?;
        if fleet.is_empty() {
            tracing::warn!(room_id = envelope.room_id, "no gateway instances registered");
        }

        let mut report = FanoutReport {
            instances: fleet.len(),
            ..FanoutReport::default()
        };
        for (instance_id, addr) in fleet {
            match self.call(&instance_id, &addr, endpoint, envelope).await {
                Ok(reply) if reply.delivered() => report.delivered += 1,
                Ok(reply) => {
                    tracing::debug!(
                        %instance_id,
                        room_id = envelope.room_id,
                        msg = %reply.msg,
                        "fan-out miss"
                    );
                }
                Err(err) => {
                    tracing::error!(%instance_id, room_id = envelope.room_id, %err, "fan-out call failed");
                }
            }
        }
        Ok(report)
    }

    async fn call(
        &self,
        instance_id: &str,
        addr: &str,
        endpoint: &str,
        envelope: &Envelope,
    ) -> Result<PushReply, RelayError> {
        let url = format!("http://{addr}/rpc/{endpoint}");
        let transport = |source| RelayError::Transport {
            instance_id: instance_id.to_string(),
            source,
        };

        self.http
            .post(&url)
            .timeout(self.rpc_timeout)
            .json(envelope)
            .send()
            .await
            .map_err(transport)?
            .json::<PushReply>()
            .await
            .map_err(transport)
    }
}
