//! Connection statistics and info structures

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ConnectionHandle, ConnectionId};

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Connections currently registered
    pub total_connections: usize,
    /// Connections registered since startup
    pub total_registered: u64,
    /// Connections removed since startup
    pub total_removed: u64,
}

/// Public view of a live connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    pub idle_seconds: u64,
}

impl From<&ConnectionHandle> for ConnectionInfo {
    fn from(handle: &ConnectionHandle) -> Self {
        Self {
            id: handle.id.clone(),
            connected_at: handle.connected_at,
            idle_seconds: handle.idle_for().as_secs(),
        }
    }
}
