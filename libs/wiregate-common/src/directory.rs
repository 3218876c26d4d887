//! External directory contracts: user presence and gateway instance
//! discovery.
//!
//! Both are owned by external infrastructure (a cache for presence, a
//! registration service for instances). The gateway and the relay only
//! consume these contracts; the in-memory implementations back
//! single-node development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory backend unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort record of which gateway instance holds a user's live
/// connection. May point at a dead instance after an ungraceful crash;
/// callers must treat a hit as a routing hint, not a guarantee.
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    async fn set(&self, user_id: i64, instance_id: &str) -> Result<(), DirectoryError>;
    async fn get(&self, user_id: i64) -> Result<Option<String>, DirectoryError>;
    async fn delete(&self, user_id: i64) -> Result<(), DirectoryError>;
}

/// Registry of live gateway instances and their RPC addresses.
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    async fn register(&self, instance_id: &str, addr: &str) -> Result<(), DirectoryError>;
    async fn deregister(&self, instance_id: &str) -> Result<(), DirectoryError>;
    async fn resolve(&self, instance_id: &str) -> Result<Option<String>, DirectoryError>;
    /// The full fleet, as `(instance_id, addr)` pairs. Room fan-out
    /// contacts every entry.
    async fn list(&self) -> Result<Vec<(String, String)>, DirectoryError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryPresence {
    data: Mutex<HashMap<i64, String>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceDirectory for MemoryPresence {
    async fn set(&self, user_id: i64, instance_id: &str) -> Result<(), DirectoryError> {
        self.data.lock().insert(user_id, instance_id.to_string());
        Ok(())
    }

    async fn get(&self, user_id: i64) -> Result<Option<String>, DirectoryError> {
        Ok(self.data.lock().get(&user_id).cloned())
    }

    async fn delete(&self, user_id: i64) -> Result<(), DirectoryError> {
        self.data.lock().remove(&user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    instances: Mutex<HashMap<String, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceDirectory for MemoryDirectory {
    async fn register(&self, instance_id: &str, addr: &str) -> Result<(), DirectoryError> {
        self.instances
            .lock()
            .insert(instance_id.to_string(), addr.to_string());
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), DirectoryError> {
        self.instances.lock().remove(instance_id);
        Ok(())
    }

    async fn resolve(&self, instance_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.instances.lock().get(instance_id).cloned())
    }

    async fn list(&self) -> Result<Vec<(String, String)>, DirectoryError> {
        let mut all: Vec<(String, String)> = self
            .instances
            .lock()
            .iter()
            .map(|(id, addr)| (id.clone(), addr.clone()))
            .collect();
        all.sort();
        Ok(all)
    }
}
