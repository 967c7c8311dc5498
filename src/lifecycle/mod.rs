//! Connect/disconnect transitions.
//!
//! `on_connect` assigns an identity and registers the connection;
//! `on_disconnect` is the single teardown path shared by read failures, write
//! failures, heartbeat evictions and shutdown. Teardown happens exactly once
//! per connection no matter how many of those paths race: the registry hands
//! the removed handle to only one caller, and the handle's close is guarded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::error::RelayError;
use crate::metrics::ConnectionMetrics;
use crate::transport::FrameSink;
use crate::websocket::welcome_text;

/// Why a connection is being torn down
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// The peer closed the channel or its stream ended
    PeerClosed,
    /// A read, write or liveness failure
    Failed(RelayError),
    /// The process is shutting down
    Shutdown,
}

impl DisconnectReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::Failed(e) => e.kind(),
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("peer closed"),
            Self::Failed(e) => write!(f, "{}", e),
            Self::Shutdown => f.write_str("server shutdown"),
        }
    }
}

pub struct LifecycleController {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
    announce_on_join: bool,
    shutdown: broadcast::Sender<()>,
}

impl LifecycleController {
    pub fn new(registry: Arc<ConnectionRegistry>, config: &WebSocketConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            registry,
            send_timeout: config.send_timeout(),
            announce_on_join: config.announce_on_join,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Receiver that fires when the process starts shutting down
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Tell every per-connection task to stop. Returns how many were listening.
    pub fn signal_shutdown(&self) -> usize {
        self.shutdown.send(()).unwrap_or(0)
    }

    /// Accept a new channel: assign a fresh identity, register it and
    /// announce the current membership to the joiner. A channel that cannot
    /// take the announcement is torn down again before this returns.
    pub async fn on_connect(&self, sink: Arc<dyn FrameSink>) -> Result<Arc<ConnectionHandle>, RelayError> {
        self.connect_as(ConnectionId::generate(), sink).await
    }

    pub(crate) async fn connect_as(
        &self,
        id: ConnectionId,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Arc<ConnectionHandle>, RelayError> {
        let handle = Arc::new(ConnectionHandle::new(id, sink, self.send_timeout));
        self.registry.register(handle.clone())?;

        let members = self.registry.ids();
        ConnectionMetrics::record_opened(members.len());
        tracing::info!(
            connection_id = %handle.id,
            total_connections = members.len(),
            "Client connected"
        );

        if self.announce_on_join {
            let welcome = welcome_text(&handle.id, &members);
            if let Err(source) = handle.send_text(welcome).await {
                tracing::warn!(
                    connection_id = %handle.id,
                    error = %source,
                    "Failed to send welcome message"
                );
                let error = RelayError::DeliveryFailed {
                    recipient: handle.id.to_string(),
                    source,
                };
                self.on_disconnect(&handle.id, DisconnectReason::Failed(error.clone()))
                    .await;
                return Err(error);
            }
        }

        Ok(handle)
    }

    /// Tear a connection down. Safe to call any number of times, from any
    /// task; returns true only for the call that performed the teardown.
    #[tracing::instrument(
        name = "lifecycle.disconnect",
        skip(self, reason),
        fields(reason = reason.label())
    )]
    pub async fn on_disconnect(&self, connection_id: &ConnectionId, reason: DisconnectReason) -> bool {
        let Some(handle) = self.registry.remove(connection_id.as_str()) else {
            tracing::debug!(connection_id = %connection_id, "Connection already torn down");
            return false;
        };

        handle.close().await;

        let lifetime = Utc::now().signed_duration_since(handle.connected_at);
        let duration_secs = lifetime.num_milliseconds().max(0) as f64 / 1000.0;
        ConnectionMetrics::record_closed(reason.label(), self.registry.len(), duration_secs);

        match &reason {
            DisconnectReason::Failed(e) => tracing::warn!(
                connection_id = %connection_id,
                error = %e,
                duration_secs = duration_secs,
                "Client disconnected"
            ),
            _ => tracing::info!(
                connection_id = %connection_id,
                reason = %reason,
                duration_secs = duration_secs,
                "Client disconnected"
            ),
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{memory, TransportError};
    use crate::websocket::parse_welcome_id;

    fn controller() -> LifecycleController {
        LifecycleController::new(Arc::new(ConnectionRegistry::new()), &WebSocketConfig::default())
    }

    #[tokio::test]
    async fn test_on_connect_registers_and_announces() {
        let lifecycle = controller();
        let (sink_a, _stream_a, mut peer_a) = memory::channel();
        let (sink_b, _stream_b, mut peer_b) = memory::channel();

        let a = lifecycle.on_connect(sink_a).await.unwrap();
        let b = lifecycle.on_connect(sink_b).await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(lifecycle.registry().contains(a.id.as_str()));
        assert!(lifecycle.registry().contains(b.id.as_str()));

        let welcome_a = peer_a.recv_text().await.unwrap();
        assert_eq!(parse_welcome_id(&welcome_a), Some(a.id.clone()));
        assert!(welcome_a.ends_with(&format!("{} (You)", a.id)));

        // B's snapshot lists A, then B itself
        let welcome_b = peer_b.recv_text().await.unwrap();
        assert_eq!(
            welcome_b,
            format!(
                "Welcome! Your Client ID: {}\nConnected Clients:\n{}\n{} (You)",
                b.id, a.id, b.id
            )
        );

        // The announcement is not kept live: A hears nothing about B
        assert!(peer_a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_announcement_can_be_disabled() {
        let config = WebSocketConfig {
            announce_on_join: false,
            ..Default::default()
        };
        let lifecycle = LifecycleController::new(Arc::new(ConnectionRegistry::new()), &config);
        let (sink, _stream, mut peer) = memory::channel();

        lifecycle.on_connect(sink).await.unwrap();
        assert!(peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_failed_welcome_tears_connection_down() {
        let lifecycle = controller();
        let (sink_a, _stream_a, _peer_a) = memory::channel();
        let (sink_b, _stream_b, peer_b) = memory::channel();
        let a = lifecycle.on_connect(sink_a).await.unwrap();
        peer_b.fail_writes(true);

        let err = lifecycle.on_connect(sink_b).await.unwrap_err();

        assert!(matches!(
            err,
            RelayError::DeliveryFailed { source: TransportError::Io(_), .. }
        ));
        assert_eq!(lifecycle.registry().ids(), vec![a.id.clone()]);
        assert_eq!(lifecycle.registry().list().len(), 1);
        assert_eq!(lifecycle.registry().stats().total_removed, 1);
        assert_eq!(peer_b.close_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_identity_is_rejected() {
        let lifecycle = controller();
        let (sink_a, _sa, _pa) = memory::channel();
        let (sink_b, _sb, _pb) = memory::channel();

        lifecycle.connect_as(ConnectionId::from("a1"), sink_a).await.unwrap();
        let err = lifecycle
            .connect_as(ConnectionId::from("a1"), sink_b)
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::DuplicateIdentity("a1".to_string()));
        assert_eq!(lifecycle.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_twice_tears_down_once() {
        let lifecycle = controller();
        let (sink, _stream, peer) = memory::channel();
        let handle = lifecycle.on_connect(sink).await.unwrap();

        let reason = DisconnectReason::Failed(RelayError::ReadFailed(TransportError::Closed));
        assert!(lifecycle.on_disconnect(&handle.id, reason).await);
        assert!(!lifecycle.on_disconnect(&handle.id, DisconnectReason::PeerClosed).await);

        assert!(!lifecycle.registry().contains(handle.id.as_str()));
        assert_eq!(peer.close_count(), 1);
        assert_eq!(lifecycle.registry().stats().total_removed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disconnects_tear_down_once() {
        let lifecycle = Arc::new(controller());
        let (sink, _stream, peer) = memory::channel();
        let handle = lifecycle.on_connect(sink).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let lifecycle = lifecycle.clone();
                let id = handle.id.clone();
                tokio::spawn(async move {
                    let reason = if i % 2 == 0 {
                        DisconnectReason::PeerClosed
                    } else {
                        DisconnectReason::Failed(RelayError::StaleConnection {
                            idle: Duration::from_secs(11),
                        })
                    };
                    lifecycle.on_disconnect(&id, reason).await
                })
            })
            .collect();

        let mut performed = 0;
        for task in tasks {
            if task.await.unwrap() {
                performed += 1;
            }
        }

        assert_eq!(performed, 1);
        assert_eq!(peer.close_count(), 1);
        assert!(lifecycle.registry().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_identity_is_noop() {
        let lifecycle = controller();
        assert!(
            !lifecycle
                .on_disconnect(&ConnectionId::from("ghost"), DisconnectReason::PeerClosed)
                .await
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_reaches_subscribers() {
        let lifecycle = controller();
        let mut rx = lifecycle.subscribe_shutdown();

        assert_eq!(lifecycle.signal_shutdown(), 1);
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(DisconnectReason::PeerClosed.label(), "peer_closed");
        assert_eq!(DisconnectReason::Shutdown.label(), "shutdown");
        let reason = DisconnectReason::Failed(RelayError::ProbeFailed(TransportError::Closed));
        assert_eq!(reason.label(), "probe_failed");
        assert_eq!(reason.to_string(), "liveness probe failed: connection closed");
    }
}
