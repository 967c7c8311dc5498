use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionHandle;
use crate::error::RelayError;
use crate::metrics::HeartbeatMetrics;
use crate::transport::Frame;

/// Payload carried by liveness probes
const PROBE_PAYLOAD: &[u8] = b"ping";

/// Liveness state of a monitored connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    /// Acknowledged since the last probe (or never probed)
    Active,
    /// Probe sent, acknowledgment outstanding
    Probing,
}

/// Why a heartbeat monitor stopped
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatExit {
    /// The connection failed its liveness check and must be torn down
    Evicted(RelayError),
    /// The connection was torn down by another path
    Closed,
    /// The process is shutting down
    Shutdown,
}

/// Heartbeat timing
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl From<&WebSocketConfig> for HeartbeatConfig {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
        }
    }
}

/// Per-connection liveness loop.
///
/// Every `ping_interval` the monitor either evicts the connection (no
/// acknowledgment for longer than `pong_timeout`) or sends a probe. A failed
/// probe evicts immediately. Acknowledgments arrive as events on `acks`, fed
/// by the connection's reader; the monitor is the only writer of the
/// connection's liveness timestamp.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    handle: Arc<ConnectionHandle>,
    acks: mpsc::Receiver<()>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatMonitor {
    pub fn new(
        config: HeartbeatConfig,
        handle: Arc<ConnectionHandle>,
        acks: mpsc::Receiver<()>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            handle,
            acks,
            shutdown,
        }
    }

    /// Run until the connection is evicted, closed, or the process shuts down
    pub async fn run(mut self) -> HeartbeatExit {
        let mut ticker = tokio::time::interval(self.config.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip immediate first tick
        ticker.tick().await;

        let mut state = LivenessState::Active;

        loop {
            // An acknowledgment already queued is applied before the tick
            // that would judge it
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    tracing::debug!(connection_id = %self.handle.id, "Heartbeat stopped by shutdown");
                    return HeartbeatExit::Shutdown;
                }
                ack = self.acks.recv() => {
                    if ack.is_none() {
                        // Reader is gone, teardown is already under way
                        return HeartbeatExit::Closed;
                    }
                    self.handle.touch();
                    state = LivenessState::Active;
                    HeartbeatMetrics::record_ack();
                }
                _ = ticker.tick() => {
                    if self.handle.is_closed() {
                        return HeartbeatExit::Closed;
                    }

                    let idle = self.handle.idle_for();
                    if idle > self.config.pong_timeout {
                        tracing::info!(
                            connection_id = %self.handle.id,
                            idle_ms = idle.as_millis() as u64,
                            state = ?state,
                            "Client inactive, evicting"
                        );
                        return HeartbeatExit::Evicted(RelayError::StaleConnection { idle });
                    }

                    if let Err(e) = self.handle.send(Frame::Ping(PROBE_PAYLOAD.to_vec())).await {
                        tracing::warn!(
                            connection_id = %self.handle.id,
                            error = %e,
                            "Error sending ping"
                        );
                        return HeartbeatExit::Evicted(RelayError::ProbeFailed(e));
                    }
                    state = LivenessState::Probing;
                    HeartbeatMetrics::record_probe();
                }
            }
        }
    }
}
