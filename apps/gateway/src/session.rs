//! WebSocket upgrade handler and per-connection session lifecycle.
//!
//! A connection is anonymous until it completes the handshake: the first
//! text frame must carry the connect payload, the token is verified
//! against the logic service, and only then does the connection get a
//! channel and a registry slot. After that three tasks cooperate: the
//! read loop (this function), the write pump draining the outbound
//! queue, and the heartbeat pump enforcing liveness.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use crate::channel::{Channel, PushError};
use crate::frames::{parse_client_frame, ping_frame, pong_frame, ClientFrame, HandshakeAck};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: handshake within the timeout, or drop the connection.
    let handshake = match time::timeout(
        state.config.handshake_timeout,
        read_handshake(&mut ws_rx),
    )
    .await
    {
        Ok(Ok(hs)) => hs,
        Ok(Err(reason)) => {
            tracing::debug!(%reason, "handshake failed");
            let _ = reject(&mut ws_tx, "invalid handshake").await;
            return;
        }
        Err(_timeout) => {
            let _ = reject(&mut ws_tx, "handshake timeout").await;
            return;
        }
    };

    // Step 2: the logic service owns authentication. The user id it
    // returns is authoritative; the one the client claimed is ignored.
    let user_id = match state
        .logic
        .connect(&handshake.token, &state.instance_id, handshake.room_id)
        .await
    {
        Ok(uid) => uid,
        Err(err) => {
            tracing::debug!(room_id = handshake.room_id, %err, "connect rejected");
            let _ = reject(&mut ws_tx, "auth failed").await;
            return;
        }
    };
    let room_id = handshake.room_id;

    // Step 3: only now does the connection get a channel and a slot.
    let (channel, outbound_rx) =
        Channel::new(user_id, room_id, state.config.send_queue_size);
    state.registry.register(user_id, room_id, channel.clone());

    tracing::info!(user_id, room_id, "session established");

    // The ack rides the outbound queue so ordering with pushes holds.
    if channel
        .try_push(HandshakeAck::success(user_id).to_json())
        .is_err()
    {
        finish(&state, &channel).await;
        return;
    }

    let writer = tokio::spawn(write_pump(ws_tx, outbound_rx, channel.clone()));
    let heartbeat = tokio::spawn(heartbeat_pump(
        channel.clone(),
        state.config.heartbeat_interval,
        state.config.heartbeat_timeout,
    ));

    // Step 4: read loop. Any inbound activity counts as liveness.
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        channel.touch();
                        if let ClientFrame::Ping = parse_client_frame(&text) {
                            if channel.try_push(pong_frame()).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(user_id, ?e, "ws read error");
                        break;
                    }
                    // Binary and transport ping/pong still prove the
                    // client is alive.
                    Some(Ok(_)) => {
                        channel.touch();
                    }
                }
            }
            _ = channel.closed() => break,
        }
    }

    channel.close();
    let _ = writer.await;
    let _ = heartbeat.await;

    finish(&state, &channel).await;
    tracing::info!(user_id, room_id, "session ended");
}

/// Tear down registry and logic-side state for a channel.
async fn finish(state: &AppState, channel: &Arc<Channel>) {
    channel.close();
    state
        .registry
        .unregister(channel.user_id, channel.room_id, channel);
    if let Err(err) = state.logic.disconnect(channel.user_id, channel.room_id).await {
        tracing::warn!(
            user_id = channel.user_id,
            room_id = channel.room_id,
            %err,
            "disconnect notify failed"
        );
    }
}

/// Read frames until the connect payload arrives. Transport control
/// frames are tolerated, anything else before the handshake is an error.
async fn read_handshake(
    ws_rx: &mut SplitStream<WebSocket>,
) -> Result<crate::frames::HandshakeRequest, &'static str> {
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(?e, "ws read error during handshake");
                return Err("read error");
            }
        };

        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => return Err("client closed"),
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => continue,
        };

        return match parse_client_frame(&text) {
            ClientFrame::Handshake(hs) => Ok(hs),
            _ => Err("expected connect frame"),
        };
    }
    Err("connection closed before handshake")
}

/// Drain the outbound queue onto the socket. Exits when the channel
/// closes or the socket errors, and always tries to send a close frame
/// so the peer sees a clean shutdown.
async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    channel: Arc<Channel>,
) {
    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            channel.close();
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = channel.closed() => break,
        }
    }

    // Flush whatever was already queued before the close won the race.
    while let Ok(text) = rx.try_recv() {
        if ws_tx.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: 1000,
            reason: "bye".into(),
        })))
        .await;
}

/// Push a ping every interval and close the session once the client has
/// been silent past the timeout.
async fn heartbeat_pump(channel: Arc<Channel>, interval: Duration, timeout: Duration) {
    let mut timer = time::interval(interval);
    timer.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            _ = timer.tick() => {
                if channel.idle_for() > timeout {
                    tracing::debug!(user_id = channel.user_id, "heartbeat timeout");
                    channel.close();
                    break;
                }
                match channel.try_push(ping_frame()) {
                    Ok(()) => {}
                    Err(PushError::Full) => {
                        tracing::warn!(user_id = channel.user_id, "outbound queue full on ping");
                        channel.close();
                        break;
                    }
                    Err(PushError::Closed) => break,
                }
            }
            _ = channel.closed() => break,
        }
    }
}

/// Send a failure ack followed by a close frame. Best effort.
async fn reject(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    reason: &str,
) -> Result<(), axum::Error> {
    let _ = ws_tx
        .send(Message::Text(HandshakeAck::failure().to_json().into()))
        .await;
    ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: 1008,
            reason: reason.to_string().into(),
        })))
        .await
}
