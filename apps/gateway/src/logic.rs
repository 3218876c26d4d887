//! Client for the external auth/logic collaborator.
//!
//! The logic service verifies handshake tokens, returns the
//! authoritative user identity, and maintains the presence directory on
//! the gateway's behalf. Nothing here is retried; a handshake failure
//! is surfaced to the client once and the connection is closed.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deadline on logic-service calls.
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LogicError {
    /// The token was examined and rejected.
    #[error("authentication rejected: {0}")]
    Rejected(String),
    /// The logic service could not be reached or answered garbage.
    #[error("logic service unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait LogicService: Send + Sync {
    /// Verify `token` and record that the user now lives on
    /// `instance_id` in `room_id`. Returns the authoritative user ID.
    async fn connect(&self, token: &str, instance_id: &str, room_id: i64)
        -> Result<i64, LogicError>;

    /// Clear presence and room membership on teardown.
    async fn disconnect(&self, user_id: i64, room_id: i64) -> Result<(), LogicError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ConnectRequest<'a> {
    token: &'a str,
    instance_id: &'a str,
    room_id: i64,
}

#[derive(Deserialize)]
struct ConnectReply {
    code: i32,
    #[serde(default)]
    user_id: i64,
}

#[derive(Serialize)]
struct DisconnectRequest {
    user_id: i64,
    room_id: i64,
}

#[derive(Clone)]
pub struct HttpLogicClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpLogicClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LogicService for HttpLogicClient {
    async fn connect(
        &self,
        token: &str,
        instance_id: &str,
        room_id: i64,
    ) -> Result<i64, LogicError> {
        let request = ConnectRequest {
            token,
            instance_id,
            room_id,
        };
        let reply: ConnectReply = self
            .http
            .post(format!("{}/connect", self.base_url))
            .timeout(RPC_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|err| LogicError::Unreachable(err.to_string()))?
            .json()
            .await
            .map_err(|err| LogicError::Unreachable(err.to_string()))?;

        if reply.code != 0 {
            return Err(LogicError::Rejected("invalid token".to_string()));
        }
        Ok(reply.user_id)
    }

    async fn disconnect(&self, user_id: i64, room_id: i64) -> Result<(), LogicError> {
        let request = DisconnectRequest { user_id, room_id };
        self.http
            .post(format!("{}/disconnect", self.base_url))
            .timeout(RPC_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|err| LogicError::Unreachable(err.to_string()))?;
        Ok(())
    }
}
