pub mod directory;
pub mod envelope;
pub mod queue;
pub mod snowflake;

pub use envelope::{Envelope, Op, PushFrame, PushReply, CODE_FAILED, CODE_SUCCESS};
pub use snowflake::SnowflakeGenerator;

/// Fixed prefix for per-instance queue topics.
pub const TOPIC_PREFIX: &str = "wiregate:push:";

/// Derive the stable identifier for a gateway instance.
///
/// Built from the RPC port and the advertised address so it can be
/// reconstructed after a restart (for re-subscribing to the instance
/// topic). In-memory connection state is always lost on restart.
pub fn instance_id(rpc_port: u16, advertise_ip: &str) -> String {
    format!("gateway-{rpc_port}-{advertise_ip}")
}

/// Name of the durable topic a gateway instance exclusively consumes.
pub fn instance_topic(instance_id: &str) -> String {
    format!("{TOPIC_PREFIX}{instance_id}")
}
