//! Connection handle and related types

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use crate::transport::{Frame, FrameSink, TransportError};

/// Opaque identity of a connection, stable for its whole session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Handle for a single accepted connection
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    sink: Arc<dyn FrameSink>,
    send_timeout: Duration,
    /// Monotonic reference point for `last_active`
    epoch: Instant,
    /// Milliseconds since `epoch` of the last liveness acknowledgment
    last_active: AtomicU64,
    closed: watch::Sender<bool>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sink: Arc<dyn FrameSink>, send_timeout: Duration) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            connected_at: Utc::now(),
            sink,
            send_timeout,
            epoch: Instant::now(),
            last_active: AtomicU64::new(0),
            closed,
        }
    }

    /// Record a liveness acknowledgment. Only the heartbeat monitor calls this.
    pub fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_active.store(elapsed, Ordering::Relaxed);
    }

    pub fn last_active(&self) -> Instant {
        self.epoch + Duration::from_millis(self.last_active.load(Ordering::Relaxed))
    }

    /// Time since the last liveness acknowledgment (or since connect)
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_active())
    }

    /// Write a frame, bounded by the configured send timeout
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        match timeout(self.send_timeout, self.sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout.as_millis() as u64)),
        }
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(Frame::Text(text.into())).await
    }

    /// Close the channel. Only the first call has any effect; returns whether
    /// this call performed the close.
    pub async fn close(&self) -> bool {
        if self.closed.send_replace(true) {
            return false;
        }

        match timeout(self.send_timeout, self.sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Error while closing channel");
            }
            Err(_) => {
                tracing::debug!(connection_id = %self.id, "Timed out closing channel");
            }
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the connection has been closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}
