//! Backend-facing delivery RPC surface.
//!
//! Four operations over JSON: push single message, push room message,
//! push room online-count, push room member-info. Replies are always a
//! `{code, msg}` status; routing misses (user not connected, room not
//! found) are ordinary failed replies, the expected frequent case in a
//! fleet with churn, never transport errors.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use wiregate_common::{Envelope, Op, PushFrame, PushReply};

use crate::channel::PushError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rpc/push", post(push_single))
        .route("/rpc/push_room", post(push_room))
        .route("/rpc/push_room_count", post(push_room_count))
        .route("/rpc/push_room_info", post(push_room_info))
}

async fn push_single(State(state): State<AppState>, Json(mut env): Json<Envelope>) -> Json<PushReply> {
    env.op = Op::SingleSend;
    Json(apply(&state, &env))
}

async fn push_room(State(state): State<AppState>, Json(mut env): Json<Envelope>) -> Json<PushReply> {
    env.op = Op::RoomSend;
    Json(apply(&state, &env))
}

async fn push_room_count(
    State(state): State<AppState>,
    Json(mut env): Json<Envelope>,
) -> Json<PushReply> {
    env.op = Op::RoomCountSend;
    Json(apply(&state, &env))
}

async fn push_room_info(
    State(state): State<AppState>,
    Json(mut env): Json<Envelope>,
) -> Json<PushReply> {
    env.op = Op::RoomInfoSend;
    Json(apply(&state, &env))
}

/// Resolve one delivery envelope against the local registries. Shared
/// by the HTTP surface and the queue consumer so the two delivery paths
/// cannot diverge in behavior.
pub fn apply(state: &AppState, env: &Envelope) -> PushReply {
    match env.op {
        Op::SingleSend => {
            let Some(channel) = state.registry.lookup(env.user_id) else {
                return PushReply::failed("user not connected");
            };
            let frame = PushFrame::message(env.body.clone()).to_json();
            match channel.try_push(frame) {
                Ok(()) => PushReply::ok("push msg to user success"),
                Err(PushError::Full) => {
                    tracing::warn!(
                        user_id = env.user_id,
                        "outbound queue full, closing slow consumer"
                    );
                    channel.close();
                    PushReply::failed("user not connected")
                }
                Err(PushError::Closed) => PushReply::failed("user not connected"),
            }
        }
        Op::RoomSend => {
            let frame = PushFrame::message(env.body.clone()).to_json();
            if state.registry.broadcast_local(env.room_id, &frame) {
                PushReply::ok("push msg to room success")
            } else {
                PushReply::failed("room not found")
            }
        }
        Op::RoomCountSend => {
            let frame = PushFrame::room_count(env.count).to_json();
            if state.registry.broadcast_local(env.room_id, &frame) {
                PushReply::ok("push room count success")
            } else {
                PushReply::failed("room not found")
            }
        }
        Op::RoomInfoSend => {
            let frame = PushFrame::room_info(env.room_user_info.clone().unwrap_or_default()).to_json();
            if state.registry.broadcast_local(env.room_id, &frame) {
                PushReply::ok("push room info success")
            } else {
                PushReply::failed("room not found")
            }
        }
    }
}
