use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wiregate_common::directory::{InstanceDirectory, MemoryDirectory};
use wiregate_common::queue::{MemoryQueue, MessageQueue};
use wiregate_gateway::config::Config;
use wiregate_gateway::logic::HttpLogicClient;
use wiregate_gateway::{consumer, router, session, AppState};

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let ws_port = config.ws_port;
    let rpc_port = config.rpc_port;

    let logic = Arc::new(HttpLogicClient::new(&config.logic_url));
    let state = AppState::new(config, logic);

    // Single-node wiring. Swap for the Redis-backed implementations when
    // running a fleet behind shared infrastructure.
    let queue: Arc<dyn MessageQueue> = Arc::new(MemoryQueue::new());
    let directory: Arc<dyn InstanceDirectory> = Arc::new(MemoryDirectory::new());

    let rpc_addr = format!("{}:{}", state.config.advertise_ip, rpc_port);
    if let Err(err) = directory.register(&state.instance_id, &rpc_addr).await {
        tracing::error!(%err, "instance registration failed");
        return;
    }

    tracing::info!(
        instance_id = %state.instance_id,
        logic_url = %state.config.logic_url,
        "gateway configured"
    );

    let consumer_handle = consumer::spawn(state.clone(), queue.clone());

    let ws_app = session::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());
    let rpc_app = router::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let ws_addr = SocketAddr::from(([0, 0, 0, 0], ws_port));
    let rpc_addr = SocketAddr::from(([0, 0, 0, 0], rpc_port));

    let ws_listener = tokio::net::TcpListener::bind(ws_addr)
        .await
        .expect("failed to bind ws port");
    let rpc_listener = tokio::net::TcpListener::bind(rpc_addr)
        .await
        .expect("failed to bind rpc port");

    tracing::info!(%ws_addr, %rpc_addr, "gateway listening");

    let ws_server = tokio::spawn(async move {
        axum::serve(ws_listener, ws_app).await.expect("ws server error");
    });
    let rpc_server = tokio::spawn(async move {
        axum::serve(rpc_listener, rpc_app).await.expect("rpc server error");
    });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutting down");

    if let Err(err) = directory.deregister(&state.instance_id).await {
        tracing::warn!(%err, "instance deregistration failed");
    }

    ws_server.abort();
    rpc_server.abort();
    consumer_handle.abort();
}
