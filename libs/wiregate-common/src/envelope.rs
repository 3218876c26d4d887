//! Cross-instance delivery envelope, the client push frame, and the
//! reply shape shared by the gateway RPC surface and its callers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Operation codes
// ---------------------------------------------------------------------------

/// The closed set of delivery operations a backend can ask a gateway
/// instance to perform. Fixed at the protocol level; integer-tagged on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Op {
    /// Deliver to one user's connection on the target instance.
    SingleSend = 1,
    /// Deliver to every local member of a room.
    RoomSend = 2,
    /// Push the room's current online count.
    RoomCountSend = 3,
    /// Push the room's member directory.
    RoomInfoSend = 4,
}

impl From<Op> for u8 {
    fn from(op: Op) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for Op {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Op::SingleSend),
            2 => Ok(Op::RoomSend),
            3 => Ok(Op::RoomCountSend),
            4 => Ok(Op::RoomInfoSend),
            other => Err(format!("unknown operation code {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery envelope
// ---------------------------------------------------------------------------

/// A message or control payload routed from a backend service to a
/// specific gateway instance, via the direct RPC path or the instance's
/// queue topic. Consumed exactly once by the receiving instance; never
/// persisted by the gateway itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: Op,
    /// Target instance; set on the queue path, empty on the direct path
    /// (the HTTP endpoint already identifies the instance).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_id: String,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub room_id: i64,
    /// Opaque payload. The gateway relays it without inspecting it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_user_info: Option<HashMap<String, String>>,
    /// Snowflake sequence/trace identifier.
    #[serde(default)]
    pub seq: i64,
}

impl Envelope {
    fn base(op: Op, seq: i64) -> Self {
        Self {
            op,
            instance_id: String::new(),
            user_id: 0,
            room_id: 0,
            body: String::new(),
            count: 0,
            room_user_info: None,
            seq,
        }
    }

    pub fn single(user_id: i64, body: impl Into<String>, seq: i64) -> Self {
        Self {
            user_id,
            body: body.into(),
            ..Self::base(Op::SingleSend, seq)
        }
    }

    pub fn room(room_id: i64, body: impl Into<String>, seq: i64) -> Self {
        Self {
            room_id,
            body: body.into(),
            ..Self::base(Op::RoomSend, seq)
        }
    }

    pub fn room_count(room_id: i64, count: i64, seq: i64) -> Self {
        Self {
            room_id,
            count,
            ..Self::base(Op::RoomCountSend, seq)
        }
    }

    pub fn room_info(room_id: i64, info: HashMap<String, String>, seq: i64) -> Self {
        Self {
            room_id,
            count: info.len() as i64,
            room_user_info: Some(info),
            ..Self::base(Op::RoomInfoSend, seq)
        }
    }
}

// ---------------------------------------------------------------------------
// Client push frame
// ---------------------------------------------------------------------------

/// Steady-state server → client push envelope.
///
/// A receiver applies only the fields that are set: `count == -1` means
/// the count is unchanged, an empty `msg` means no message, and a
/// `null` `room_user_info` means the member directory is unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub count: i64,
    pub msg: String,
    pub room_user_info: Option<HashMap<String, String>>,
}

impl PushFrame {
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            count: -1,
            msg: msg.into(),
            room_user_info: None,
        }
    }

    pub fn room_count(count: i64) -> Self {
        Self {
            count,
            msg: String::new(),
            room_user_info: None,
        }
    }

    pub fn room_info(info: HashMap<String, String>) -> Self {
        Self {
            count: -1,
            msg: String::new(),
            room_user_info: Some(info),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Gateway RPC reply
// ---------------------------------------------------------------------------

pub const CODE_SUCCESS: i32 = 0;
pub const CODE_FAILED: i32 = 1;

/// Status reply from a gateway's delivery RPC surface. Routing misses
/// (`not connected`, `room not found`) are ordinary failed replies, not
/// transport errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushReply {
    pub code: i32,
    pub msg: String,
}

impl PushReply {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            code: CODE_SUCCESS,
            msg: msg.into(),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            code: CODE_FAILED,
            msg: msg.into(),
        }
    }

    pub fn delivered(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}
