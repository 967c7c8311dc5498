use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::RelayError;

use super::{ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionStats};

struct Entry {
    /// Join order, used to give snapshots a stable ordering
    seq: u64,
    handle: Arc<ConnectionHandle>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, Entry>,
    next_seq: u64,
    total_removed: u64,
}

/// The authoritative table of live connections.
///
/// Every operation takes the same lock and releases it before returning, so
/// callers never write to a channel while holding it.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock()
    }

    /// Register a connection under its identity
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Result<(), RelayError> {
        // A torn-down connection never comes back
        if handle.is_closed() {
            return Err(RelayError::ConnectionClosed(handle.id.to_string()));
        }

        let mut inner = self.lock();
        if inner.connections.contains_key(&handle.id) {
            return Err(RelayError::DuplicateIdentity(handle.id.to_string()));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let conn_id = handle.id.clone();
        inner.connections.insert(conn_id.clone(), Entry { seq, handle });
        let total = inner.connections.len();
        drop(inner);

        tracing::debug!(connection_id = %conn_id, total_connections = total, "Connection registered");
        Ok(())
    }

    /// Resolve an identity to its live connection
    pub fn lookup(&self, connection_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.lock()
            .connections
            .get(connection_id)
            .map(|entry| entry.handle.clone())
    }

    /// Remove a connection. Returns the handle only for the call that actually
    /// removed it; later calls are no-ops.
    pub fn remove(&self, connection_id: &str) -> Option<Arc<ConnectionHandle>> {
        let mut inner = self.lock();
        let entry = inner.connections.remove(connection_id)?;
        inner.total_removed += 1;
        let total = inner.connections.len();
        drop(inner);

        tracing::debug!(connection_id = %connection_id, total_connections = total, "Connection unregistered");
        Some(entry.handle)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.lock().connections.contains_key(connection_id)
    }

    /// Point-in-time copy of all live connections, in join order
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        let mut entries: Vec<(u64, Arc<ConnectionHandle>)> = self
            .lock()
            .connections
            .values()
            .map(|entry| (entry.seq, entry.handle.clone()))
            .collect();

        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Identities of all live connections, in join order
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.snapshot().iter().map(|h| h.id.clone()).collect()
    }

    /// "Who's online" listing
    pub fn list(&self) -> Vec<ConnectionInfo> {
        self.snapshot()
            .iter()
            .map(|h| ConnectionInfo::from(h.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ConnectionStats {
        let inner = self.lock();
        ConnectionStats {
            total_connections: inner.connections.len(),
            total_registered: inner.next_seq,
            total_removed: inner.total_removed,
        }
    }
}
