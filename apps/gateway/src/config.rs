use std::time::Duration;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the client-facing WebSocket server binds to.
    pub ws_port: u16,
    /// Port the backend-facing delivery RPC server binds to.
    pub rpc_port: u16,
    /// Address other services reach this instance at; combined with
    /// `rpc_port` it forms the stable instance identifier.
    pub advertise_ip: String,
    /// Origin of the logic service (e.g. `http://localhost:7600`).
    pub logic_url: String,
    /// How often the heartbeat loop wakes per connection.
    pub heartbeat_interval: Duration,
    /// Idle window after which a connection is considered dead. Must be
    /// larger than the interval.
    pub heartbeat_timeout: Duration,
    /// Deadline for the client's first (handshake) frame.
    pub handshake_timeout: Duration,
    /// Capacity of each connection's outbound queue.
    pub send_queue_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            ws_port: env_or("WS_PORT", 7100),
            rpc_port: env_or("RPC_PORT", 7101),
            advertise_ip: std::env::var("ADVERTISE_IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            logic_url: required_var("LOGIC_URL"),
            heartbeat_interval: Duration::from_secs(env_or("HEARTBEAT_INTERVAL_SECS", 30)),
            heartbeat_timeout: Duration::from_secs(env_or("HEARTBEAT_TIMEOUT_SECS", 60)),
            handshake_timeout: Duration::from_secs(env_or("HANDSHAKE_TIMEOUT_SECS", 10)),
            send_queue_size: env_or("SEND_QUEUE_SIZE", 256),
        }
    }

    /// The stable identifier this instance registers and consumes under.
    pub fn instance_id(&self) -> String {
        wiregate_common::instance_id(self.rpc_port, &self.advertise_ip)
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
