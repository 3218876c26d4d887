//! Per-instance queue consumer.
//!
//! Subscribes to this instance's push topic and replays each envelope
//! through the same dispatch path the RPC surface uses. Routing misses
//! are expected here: a user can disconnect between enqueue and
//! consume, and the envelope is simply dropped.

use std::sync::Arc;

use tokio::task::JoinHandle;

use wiregate_common::queue::MessageQueue;
use wiregate_common::{instance_topic, CODE_SUCCESS};

use crate::router;
use crate::AppState;

pub fn spawn(state: AppState, queue: Arc<dyn MessageQueue>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let topic = instance_topic(&state.instance_id);
        let mut rx = match queue.subscribe(&topic).await {
            Ok(rx) => rx,
            Err(err) => {
                tracing::error!(%topic, %err, "queue subscribe failed");
                return;
            }
        };

        tracing::info!(%topic, "consuming instance queue");

        while let Some(envelope) = rx.recv().await {
            let reply = router::apply(&state, &envelope);
            if reply.code != CODE_SUCCESS {
                tracing::debug!(
                    op = ?envelope.op,
                    user_id = envelope.user_id,
                    seq = envelope.seq,
                    msg = %reply.msg,
                    "queued envelope dropped"
                );
            }
        }

        tracing::info!(%topic, "instance queue closed");
    })
}
