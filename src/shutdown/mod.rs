//! Graceful shutdown of the relay.
//!
//! Shutdown runs in three phases:
//! 1. Signal every heartbeat monitor to stop
//! 2. Tear down every live connection through the lifecycle
//! 3. Wait (bounded) for the registry to drain

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use crate::lifecycle::{DisconnectReason, LifecycleController};

/// How often the drain phase re-checks the registry
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for the registry to empty (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a shutdown sequence
#[derive(Debug, Clone, Default)]
pub struct ShutdownResult {
    pub monitors_signalled: usize,
    pub connections_closed: usize,
    pub connections_remaining: usize,
    pub duration: Duration,
    pub success: bool,
}

pub struct GracefulShutdown {
    lifecycle: Arc<LifecycleController>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(lifecycle: Arc<LifecycleController>) -> Self {
        Self::with_config(lifecycle, ShutdownConfig::default())
    }

    pub fn with_config(lifecycle: Arc<LifecycleController>, config: ShutdownConfig) -> Self {
        Self { lifecycle, config }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.lifecycle.registry().len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = tokio::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Stopping heartbeats");
        result.monitors_signalled = self.lifecycle.signal_shutdown();

        tracing::info!("Phase 2: Closing connections");
        result.connections_closed = self.close_connections().await;

        tracing::info!("Phase 3: Waiting for registry to drain");
        result.connections_remaining = self.wait_for_drain().await;

        result.duration = start.elapsed();
        result.success = result.connections_remaining == 0;

        tracing::info!(
            monitors_signalled = result.monitors_signalled,
            connections_closed = result.connections_closed,
            connections_remaining = result.connections_remaining,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn close_connections(&self) -> usize {
        let ids = self.lifecycle.registry().ids();
        if ids.is_empty() {
            return 0;
        }

        let teardowns = ids
            .iter()
            .map(|id| self.lifecycle.on_disconnect(id, DisconnectReason::Shutdown));
        join_all(teardowns).await.into_iter().filter(|closed| *closed).count()
    }

    /// Returns the number of connections still registered when waiting stops
    async fn wait_for_drain(&self) -> usize {
        let registry = self.lifecycle.registry();

        let drained = timeout(self.config.drain_timeout, async {
            while !registry.is_empty() {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;

        let remaining = registry.len();
        if drained.is_err() {
            tracing::warn!(remaining = remaining, "Timeout waiting for connections to close");
        }
        remaining
    }
}
