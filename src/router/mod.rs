//! Message routing.
//!
//! Each inbound payload is routed synchronously by the sender's reader task,
//! so messages from one sender reach a given recipient in the order sent.
//! Destinations are resolved through the registry; writes happen afterwards,
//! outside the registry lock.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::connection_manager::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::error::RelayError;
use crate::lifecycle::{DisconnectReason, LifecycleController};
use crate::metrics::RouteMetrics;
use crate::transport::Frame;
use crate::websocket::{delivery_text, Envelope};

/// Routing policy of a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// `{ "id", "message" }` envelopes delivered to one recipient
    #[default]
    Unicast,
    /// Raw payloads delivered to every other connection
    Broadcast,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unicast => "unicast",
            Self::Broadcast => "broadcast",
        }
    }
}

/// Inbound application payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    fn into_frame(self) -> Frame {
        match self {
            Self::Text(text) => Frame::Text(text),
            Self::Binary(data) => Frame::Binary(data),
        }
    }

    /// Frame of the same kind as this payload carrying `text`
    fn reply_frame(&self, text: String) -> Frame {
        match self {
            Self::Text(_) => Frame::Text(text),
            Self::Binary(_) => Frame::Binary(text.into_bytes()),
        }
    }
}

/// Outcome of a successful route call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Recipients written to successfully
    pub delivered: usize,
    /// Recipients whose write failed (and who were torn down)
    pub failed: usize,
}

pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    lifecycle: Arc<LifecycleController>,
    mode: RoutingMode,
}

impl MessageRouter {
    pub fn new(lifecycle: Arc<LifecycleController>, mode: RoutingMode) -> Self {
        Self {
            registry: lifecycle.registry().clone(),
            lifecycle,
            mode,
        }
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Route one inbound payload from `sender`
    #[tracing::instrument(
        name = "router.route",
        skip(self, payload),
        fields(sender = %sender, mode = self.mode.as_str())
    )]
    pub async fn route(&self, sender: &ConnectionId, payload: Payload) -> Result<RouteReport, RelayError> {
        RouteMetrics::record_routed(self.mode);

        let result = match self.mode {
            RoutingMode::Unicast => self.route_envelope(sender, payload).await,
            RoutingMode::Broadcast => Ok(self.broadcast(sender, payload.into_frame()).await),
        };

        if let Err(e) = &result {
            RouteMetrics::record_error(e.kind());
        }
        result
    }

    async fn route_envelope(&self, sender: &ConnectionId, payload: Payload) -> Result<RouteReport, RelayError> {
        let envelope = Envelope::parse(payload.as_bytes())?;

        match envelope.recipient() {
            Some(recipient) => {
                tracing::debug!(sender = %sender, recipient = %recipient, "Message received");
                let frame = payload.reply_frame(delivery_text(sender, &envelope.message));
                self.send_to(recipient, frame).await
            }
            // No recipient: everyone but the sender
            None => {
                let frame = payload.reply_frame(envelope.message);
                Ok(self.broadcast(sender, frame).await)
            }
        }
    }

    /// Deliver to one recipient: exactly one write or exactly one error
    async fn send_to(&self, recipient: &str, frame: Frame) -> Result<RouteReport, RelayError> {
        let Some(handle) = self.registry.lookup(recipient) else {
            return Err(RelayError::UnknownRecipient(recipient.to_string()));
        };

        match handle.send(frame).await {
            Ok(()) => {
                RouteMetrics::record_delivered(1);
                Ok(RouteReport {
                    delivered: 1,
                    failed: 0,
                })
            }
            Err(source) => {
                RouteMetrics::record_failed(1);
                let error = RelayError::DeliveryFailed {
                    recipient: recipient.to_string(),
                    source,
                };
                self.lifecycle
                    .on_disconnect(&handle.id, DisconnectReason::Failed(error.clone()))
                    .await;
                Err(error)
            }
        }
    }

    /// Write `frame` to every connection except the sender. A failed write
    /// tears down that recipient only; the rest still get the message.
    async fn broadcast(&self, sender: &ConnectionId, frame: Frame) -> RouteReport {
        let recipients: Vec<Arc<ConnectionHandle>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|handle| &handle.id != sender)
            .collect();

        if recipients.is_empty() {
            return RouteReport::default();
        }

        let futures = recipients.into_iter().map(|handle| {
            let frame = frame.clone();
            async move {
                match handle.send(frame).await {
                    Ok(()) => true,
                    Err(source) => {
                        tracing::warn!(
                            recipient = %handle.id,
                            error = %source,
                            "Error broadcasting to client"
                        );
                        let error = RelayError::DeliveryFailed {
                            recipient: handle.id.to_string(),
                            source,
                        };
                        self.lifecycle
                            .on_disconnect(&handle.id, DisconnectReason::Failed(error))
                            .await;
                        false
                    }
                }
            }
        });

        let results = join_all(futures).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - delivered;

        RouteMetrics::record_delivered(delivered as u64);
        RouteMetrics::record_failed(failed as u64);
        tracing::debug!(
            sender = %sender,
            delivered = delivered,
            failed = failed,
            "Broadcast completed"
        );

        RouteReport { delivered, failed }
    }
}
