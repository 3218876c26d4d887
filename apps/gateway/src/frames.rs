//! Client-facing session frames: the connect handshake, its
//! acknowledgment, and ping/pong keepalive.

use serde::{Deserialize, Serialize};

pub const HANDSHAKE_MESSAGE: &str = "connect";

pub const ACK_SUCCESS: &str = "success";
pub const ACK_FAIL: &str = "fail";

/// First frame a client must send: `{user_id, room_id, token,
/// message: "connect"}`. The `user_id` is advisory only; the
/// authoritative identity comes back from the logic service.
#[derive(Debug, Deserialize)]
pub struct HandshakeRequest {
    #[serde(default)]
    pub user_id: i64,
    pub room_id: i64,
    pub token: String,
    pub message: String,
}

/// Explicit success/failure acknowledgment for the handshake.
#[derive(Debug, Serialize, Deserialize)]
pub struct HandshakeAck {
    pub status: String,
    #[serde(default)]
    pub user_id: i64,
}

impl HandshakeAck {
    pub fn success(user_id: i64) -> Self {
        Self {
            status: ACK_SUCCESS.to_string(),
            user_id,
        }
    }

    pub fn failure() -> Self {
        Self {
            status: ACK_FAIL.to_string(),
            user_id: 0,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ControlFrame {
    #[serde(rename = "type")]
    kind: String,
}

pub fn ping_frame() -> String {
    r#"{"type":"ping"}"#.to_string()
}

pub fn pong_frame() -> String {
    r#"{"type":"pong"}"#.to_string()
}

/// An inbound text frame, classified.
#[derive(Debug)]
pub enum ClientFrame {
    Handshake(HandshakeRequest),
    Ping,
    Pong,
    /// Anything else counts as protocol-level keepalive.
    Other,
}

pub fn parse_client_frame(text: &str) -> ClientFrame {
    if let Ok(handshake) = serde_json::from_str::<HandshakeRequest>(text) {
        if handshake.message == HANDSHAKE_MESSAGE {
            return ClientFrame::Handshake(handshake);
        }
    }
    if let Ok(control) = serde_json::from_str::<ControlFrame>(text) {
        match control.kind.as_str() {
            "ping" => return ClientFrame::Ping,
            "pong" => return ClientFrame::Pong,
            _ => {}
        }
    }
    ClientFrame::Other
}
