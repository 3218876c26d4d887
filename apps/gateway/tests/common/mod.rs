#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use wiregate_common::directory::{InstanceDirectory, MemoryDirectory, MemoryPresence, PresenceDirectory};
use wiregate_common::queue::{MemoryQueue, MessageQueue};
use wiregate_gateway::config::Config;
use wiregate_gateway::logic::{LogicError, LogicService};
use wiregate_gateway::{consumer, router, session, AppState};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Token-parsing stand-in for the logic service: `tok:{uid}` verifies to
/// that user id, anything else is rejected. Maintains the presence
/// directory the way the real service does.
pub struct StubLogic {
    presence: Arc<MemoryPresence>,
}

impl StubLogic {
    pub fn new(presence: Arc<MemoryPresence>) -> Self {
        Self { presence }
    }
}

#[async_trait]
impl LogicService for StubLogic {
    async fn connect(
        &self,
        token: &str,
        instance_id: &str,
        _room_id: i64,
    ) -> Result<i64, LogicError> {
        let uid = token
            .strip_prefix("tok:")
            .and_then(|raw| raw.parse::<i64>().ok())
            .ok_or_else(|| LogicError::Rejected("invalid token".to_string()))?;
        self.presence
            .set(uid, instance_id)
            .await
            .map_err(|err| LogicError::Unreachable(err.to_string()))?;
        Ok(uid)
    }

    async fn disconnect(&self, user_id: i64, _room_id: i64) -> Result<(), LogicError> {
        self.presence
            .delete(user_id)
            .await
            .map_err(|err| LogicError::Unreachable(err.to_string()))?;
        Ok(())
    }
}

/// Shared backing infrastructure for one test "fleet".
pub struct Backplane {
    pub presence: Arc<MemoryPresence>,
    pub directory: Arc<MemoryDirectory>,
    pub queue: Arc<MemoryQueue>,
}

impl Backplane {
    pub fn new() -> Self {
        Self {
            presence: Arc::new(MemoryPresence::new()),
            directory: Arc::new(MemoryDirectory::new()),
            queue: Arc::new(MemoryQueue::new()),
        }
    }
}

/// One running gateway instance bound to ephemeral ports.
pub struct Gateway {
    pub ws_addr: SocketAddr,
    pub rpc_addr: SocketAddr,
    pub state: AppState,
}

impl Gateway {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.ws_addr)
    }

    pub fn rpc_url(&self, endpoint: &str) -> String {
        format!("http://{}/rpc/{endpoint}", self.rpc_addr)
    }
}

pub fn test_config() -> Config {
    Config {
        ws_port: 0,
        rpc_port: 0,
        advertise_ip: "127.0.0.1".to_string(),
        logic_url: "http://logic.invalid".to_string(),
        heartbeat_interval: Duration::from_secs(30),
        heartbeat_timeout: Duration::from_secs(60),
        handshake_timeout: Duration::from_secs(5),
        send_queue_size: 32,
    }
}

/// Start a gateway with default timings.
pub async fn start_gateway(backplane: &Backplane) -> Gateway {
    start_gateway_with(backplane, test_config()).await
}

/// Start a gateway, binding both listeners on ephemeral ports. The real
/// RPC port feeds the instance id so multiple gateways in one test get
/// distinct identities.
pub async fn start_gateway_with(backplane: &Backplane, mut config: Config) -> Gateway {
    let ws_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ws");
    let rpc_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind rpc");
    let ws_addr = ws_listener.local_addr().unwrap();
    let rpc_addr = rpc_listener.local_addr().unwrap();

    config.ws_port = ws_addr.port();
    config.rpc_port = rpc_addr.port();

    let logic = Arc::new(StubLogic::new(backplane.presence.clone()));
    let state = AppState::new(config, logic);

    backplane
        .directory
        .register(&state.instance_id, &rpc_addr.to_string())
        .await
        .expect("register instance");

    let queue: Arc<dyn MessageQueue> = backplane.queue.clone();
    consumer::spawn(state.clone(), queue);

    let ws_app = session::router().with_state(state.clone());
    let rpc_app = router::router().with_state(state.clone());
    tokio::spawn(async move {
        axum::serve(ws_listener, ws_app).await.unwrap();
    });
    tokio::spawn(async move {
        axum::serve(rpc_listener, rpc_app).await.unwrap();
    });

    Gateway {
        ws_addr,
        rpc_addr,
        state,
    }
}

/// Open a socket and complete the handshake; asserts the success ack and
/// returns the stream ready for pushes.
pub async fn connect_user(gateway: &Gateway, user_id: i64, room_id: i64) -> Ws {
    let (mut ws, _) = tokio_tungstenite::connect_async(&gateway.ws_url())
        .await
        .expect("ws connect");

    let handshake = serde_json::json!({
        "room_id": room_id,
        "token": format!("tok:{user_id}"),
        "message": "connect",
    });
    ws.send(tungstenite::Message::Text(handshake.to_string().into()))
        .await
        .expect("send handshake");

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["status"], "success");
    assert_eq!(ack["user_id"], user_id);
    ws
}

/// Next text frame as JSON, with a timeout. Panics on close or error.
pub async fn next_json(ws: &mut Ws) -> serde_json::Value {
    let text = next_text(ws).await;
    serde_json::from_str(&text).expect("frame is json")
}

pub async fn next_text(ws: &mut Ws) -> String {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => return text.to_string(),
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Wait until the peer closes the connection.
pub async fn expect_close(ws: &mut Ws) {
    loop {
        match time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close")
        {
            Some(Ok(tungstenite::Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    }
}

/// Call a delivery RPC endpoint directly and return the reply.
pub async fn rpc_call(
    gateway: &Gateway,
    endpoint: &str,
    envelope: serde_json::Value,
) -> serde_json::Value {
    let client = reqwest::Client::new();
    client
        .post(gateway.rpc_url(endpoint))
        .json(&envelope)
        .send()
        .await
        .expect("rpc request")
        .json()
        .await
        .expect("parse rpc reply")
}
