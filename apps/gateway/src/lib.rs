pub mod channel;
pub mod config;
pub mod consumer;
pub mod frames;
pub mod logic;
pub mod registry;
pub mod router;
pub mod session;

use std::sync::Arc;

use config::Config;
use logic::LogicService;
use registry::ConnectionRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Stable identity of this gateway instance, derived from config.
    pub instance_id: String,
    pub registry: Arc<ConnectionRegistry>,
    pub logic: Arc<dyn LogicService>,
}

impl AppState {
    pub fn new(config: Config, logic: Arc<dyn LogicService>) -> Self {
        let instance_id = config.instance_id();
        Self {
            config: Arc::new(config),
            instance_id,
            registry: Arc::new(ConnectionRegistry::new()),
            logic,
        }
    }
}
