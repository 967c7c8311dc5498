//! Per-connection session: registration, the heartbeat task, and the reader
//! loop that feeds the router.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::connection_manager::ConnectionHandle;
use crate::error::RelayError;
use crate::lifecycle::DisconnectReason;
use crate::router::Payload;
use crate::server::AppState;
use crate::tasks::{HeartbeatConfig, HeartbeatExit, HeartbeatMonitor};
use crate::transport::{Frame, FrameSink, FrameStream};

/// Pending liveness acknowledgments; one is enough to refresh the timestamp
const ACK_CHANNEL_CAPACITY: usize = 4;

/// Drive one accepted connection until it is torn down.
///
/// The reader runs on the calling task and routes each inbound message before
/// reading the next one; the heartbeat monitor runs on its own task. Whichever
/// side fails first triggers the shared teardown.
#[tracing::instrument(name = "ws.session", skip_all)]
pub async fn run_session(state: AppState, sink: Arc<dyn FrameSink>, mut stream: FrameStream) {
    let handle = match state.lifecycle.on_connect(sink.clone()).await {
        Ok(handle) => handle,
        // Already torn down by the lifecycle
        Err(e @ RelayError::DeliveryFailed { .. }) => {
            tracing::debug!(error = %e, "Connection dropped before its session started");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Connection rejected");
            let _ = sink.close().await;
            return;
        }
    };
    let connection_id = handle.id.clone();

    let (ack_tx, ack_rx) = mpsc::channel(ACK_CHANNEL_CAPACITY);
    let monitor = HeartbeatMonitor::new(
        HeartbeatConfig::from(&state.settings.websocket),
        handle.clone(),
        ack_rx,
        state.lifecycle.subscribe_shutdown(),
    );

    let lifecycle = state.lifecycle.clone();
    let heartbeat_id = connection_id.clone();
    let heartbeat_task = tokio::spawn(async move {
        if let HeartbeatExit::Evicted(e) = monitor.run().await {
            lifecycle
                .on_disconnect(&heartbeat_id, DisconnectReason::Failed(e))
                .await;
        }
    });

    let reason = read_loop(&state, &handle, &mut stream, &ack_tx).await;
    state.lifecycle.on_disconnect(&connection_id, reason).await;

    drop(ack_tx);
    if let Err(e) = heartbeat_task.await {
        tracing::error!(connection_id = %connection_id, error = %e, "Heartbeat task panicked");
    }
}

/// Read until the peer goes away or the connection is torn down elsewhere
async fn read_loop(
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
    stream: &mut FrameStream,
    acks: &mpsc::Sender<()>,
) -> DisconnectReason {
    loop {
        // Teardown wins over frames still buffered on the stream
        let next = tokio::select! {
            biased;

            _ = handle.closed() => {
                tracing::debug!(connection_id = %handle.id, "Connection closed, stopping reader");
                return DisconnectReason::PeerClosed;
            }
            next = stream.next() => next,
        };

        let payload = match next {
            None | Some(Ok(Frame::Close)) => return DisconnectReason::PeerClosed,
            Some(Err(e)) => {
                tracing::debug!(connection_id = %handle.id, error = %e, "Error reading message");
                return DisconnectReason::Failed(RelayError::ReadFailed(e));
            }
            Some(Ok(Frame::Pong(_))) => {
                // A full queue already holds an acknowledgment
                let _ = acks.try_send(());
                continue;
            }
            // Answered by the transport; not a liveness signal
            Some(Ok(Frame::Ping(_))) => continue,
            Some(Ok(Frame::Text(text))) => Payload::Text(text),
            Some(Ok(Frame::Binary(data))) => Payload::Binary(data),
        };

        if handle.is_closed() {
            tracing::debug!(connection_id = %handle.id, "Dropping message from torn-down connection");
            return DisconnectReason::PeerClosed;
        }

        match state.router.route(&handle.id, payload).await {
            Ok(report) => {
                tracing::trace!(
                    connection_id = %handle.id,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Message routed"
                );
            }
            Err(RelayError::MalformedMessage(e)) => {
                tracing::warn!(connection_id = %handle.id, error = %e, "Invalid message format");
            }
            Err(e) => {
                tracing::warn!(connection_id = %handle.id, error = %e, "Failed to route message");
            }
        }
    }
}
