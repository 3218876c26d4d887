mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

use common::{
    connect_user, expect_close, next_json, start_gateway, start_gateway_with, test_config, Backplane,
};

#[tokio::test]
async fn handshake_returns_authoritative_user_id() {
    let backplane = Backplane::new();
    let gateway = start_gateway(&backplane).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&gateway.ws_url())
        .await
        .expect("ws connect");

    // The claimed user_id is ignored; the token decides.
    let handshake = serde_json::json!({
        "user_id": 999,
        "room_id": 7,
        "token": "tok:42",
        "message": "connect",
    });
    ws.send(tungstenite::Message::Text(handshake.to_string().into()))
        .await
        .expect("send handshake");

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["status"], "success");
    assert_eq!(ack["user_id"], 42);

    assert_eq!(gateway.state.registry.user_count(), 1);
    assert_eq!(gateway.state.registry.room_len(7), 1);
}

#[tokio::test]
async fn handshake_records_presence_on_this_instance() {
    let backplane = Backplane::new();
    let gateway = start_gateway(&backplane).await;

    let _ws = connect_user(&gateway, 42, 7).await;

    use wiregate_common::directory::PresenceDirectory;
    let location = backplane.presence.get(42).await.unwrap();
    assert_eq!(location.as_deref(), Some(gateway.state.instance_id.as_str()));
}

#[tokio::test]
async fn bad_token_gets_fail_ack_then_close() {
    let backplane = Backplane::new();
    let gateway = start_gateway(&backplane).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&gateway.ws_url())
        .await
        .expect("ws connect");

    let handshake = serde_json::json!({
        "room_id": 7,
        "token": "garbage",
        "message": "connect",
    });
    ws.send(tungstenite::Message::Text(handshake.to_string().into()))
        .await
        .expect("send handshake");

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["status"], "fail");

    expect_close(&mut ws).await;
    assert_eq!(gateway.state.registry.user_count(), 0);
}

#[tokio::test]
async fn non_handshake_first_frame_is_rejected() {
    let backplane = Backplane::new();
    let gateway = start_gateway(&backplane).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&gateway.ws_url())
        .await
        .expect("ws connect");

    ws.send(tungstenite::Message::Text(
        r#"{"type":"ping"}"#.to_string().into(),
    ))
    .await
    .expect("send frame");

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["status"], "fail");
    expect_close(&mut ws).await;
}

#[tokio::test]
async fn silent_connection_is_dropped_at_handshake_timeout() {
    let backplane = Backplane::new();
    let mut config = test_config();
    config.handshake_timeout = Duration::from_millis(100);
    let gateway = start_gateway_with(&backplane, config).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&gateway.ws_url())
        .await
        .expect("ws connect");

    // Say nothing. The server should give up on us.
    expect_close(&mut ws).await;
}

#[tokio::test]
async fn client_ping_gets_pong() {
    let backplane = Backplane::new();
    let gateway = start_gateway(&backplane).await;
    let mut ws = connect_user(&gateway, 42, 7).await;

    ws.send(tungstenite::Message::Text(
        r#"{"type":"ping"}"#.to_string().into(),
    ))
    .await
    .expect("send ping");

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn server_pings_on_the_heartbeat_interval() {
    let backplane = Backplane::new();
    let mut config = test_config();
    config.heartbeat_interval = Duration::from_millis(50);
    let gateway = start_gateway_with(&backplane, config).await;
    let mut ws = connect_user(&gateway, 42, 7).await;

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "ping");
}

#[tokio::test]
async fn idle_connection_is_closed_after_heartbeat_timeout() {
    let backplane = Backplane::new();
    let mut config = test_config();
    config.heartbeat_interval = Duration::from_millis(50);
    config.heartbeat_timeout = Duration::from_millis(150);
    let gateway = start_gateway_with(&backplane, config).await;
    let mut ws = connect_user(&gateway, 42, 7).await;

    expect_close(&mut ws).await;

    // Registry and presence are cleaned up after teardown.
    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.state.registry.user_count(), 0);
    use wiregate_common::directory::PresenceDirectory;
    assert_eq!(backplane.presence.get(42).await.unwrap(), None);
}

#[tokio::test]
async fn pong_replies_keep_the_connection_alive() {
    let backplane = Backplane::new();
    let mut config = test_config();
    config.heartbeat_interval = Duration::from_millis(50);
    config.heartbeat_timeout = Duration::from_millis(200);
    let gateway = start_gateway_with(&backplane, config).await;
    let mut ws = connect_user(&gateway, 42, 7).await;

    // Answer pings for long enough that a silent peer would have been
    // dropped several times over.
    let deadline = time::Instant::now() + Duration::from_millis(600);
    while time::Instant::now() < deadline {
        let msg = time::timeout(Duration::from_secs(1), ws.next())
            .await
            .expect("timeout")
            .expect("stream ended")
            .expect("read error");
        match msg {
            tungstenite::Message::Text(text) if text.contains("ping") => {
                ws.send(tungstenite::Message::Text(
                    r#"{"type":"pong"}"#.to_string().into(),
                ))
                .await
                .expect("send pong");
            }
            tungstenite::Message::Close(_) => panic!("closed despite pongs"),
            _ => {}
        }
    }

    assert_eq!(gateway.state.registry.user_count(), 1);
}

#[tokio::test]
async fn binary_frames_keep_the_connection_alive() {
    let backplane = Backplane::new();
    let mut config = test_config();
    config.heartbeat_interval = Duration::from_millis(50);
    config.heartbeat_timeout = Duration::from_millis(200);
    let gateway = start_gateway_with(&backplane, config).await;
    let mut ws = connect_user(&gateway, 42, 7).await;

    // The client only ever sends binary frames. That is still activity,
    // so it must outlive several heartbeat timeouts.
    let deadline = time::Instant::now() + Duration::from_millis(600);
    while time::Instant::now() < deadline {
        ws.send(tungstenite::Message::Binary(vec![0xAB].into()))
            .await
            .expect("send binary");

        match time::timeout(Duration::from_millis(50), ws.next()).await {
            Ok(Some(Ok(tungstenite::Message::Close(_)))) | Ok(None) => {
                panic!("closed despite binary activity")
            }
            _ => {}
        }
    }

    assert_eq!(gateway.state.registry.user_count(), 1);
}

#[tokio::test]
async fn reconnect_supersedes_the_old_connection() {
    let backplane = Backplane::new();
    let gateway = start_gateway(&backplane).await;

    let mut first = connect_user(&gateway, 42, 7).await;
    let _second = connect_user(&gateway, 42, 7).await;

    // The old socket is told to go away; the registry keeps exactly one
    // entry for the user.
    expect_close(&mut first).await;
    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.state.registry.user_count(), 1);
    assert_eq!(gateway.state.registry.room_len(7), 1);
}

#[tokio::test]
async fn disconnect_clears_registry_and_presence() {
    let backplane = Backplane::new();
    let gateway = start_gateway(&backplane).await;

    let mut ws = connect_user(&gateway, 42, 7).await;
    ws.close(None).await.expect("close");

    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.state.registry.user_count(), 0);
    assert_eq!(gateway.state.registry.room_len(7), 0);
    use wiregate_common::directory::PresenceDirectory;
    assert_eq!(backplane.presence.get(42).await.unwrap(), None);
}
