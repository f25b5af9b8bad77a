use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use tokio::time::Instant;

/// Identifier a worker picks for itself and announces in `REGISTER`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Generates an id of the form `Slave_1a2b3c4d`.
    pub fn new() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("Slave_{}", &raw[..8]))
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A worker as seen by the coordinator.
///
/// `current_tasks` counts dispatched-but-unreleased work and never underflows.
/// Liveness is derived from `last_heartbeat`; there is no explicit state field.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub addr: SocketAddr,
    pub current_tasks: u32,
    pub last_heartbeat: Instant,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            current_tasks: 0,
            last_heartbeat: Instant::now(),
        }
    }

    pub fn is_active(&self, now: Instant, timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) < timeout
    }
}

/// Point-in-time view of a worker, used by status reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub addr: SocketAddr,
    pub current_tasks: u32,
    pub secs_since_heartbeat: u64,
    pub active: bool,
}
