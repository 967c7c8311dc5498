//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED, CONNECTIONS_OPENED, CONNECTION_DURATION,
    DELIVERIES_TOTAL, DELIVERY_FAILURES_TOTAL, DISCONNECTS_TOTAL, HEARTBEAT_ACKS_TOTAL,
    HEARTBEAT_PROBES_TOTAL, MESSAGES_ROUTED_TOTAL, ROUTE_ERRORS_TOTAL,
};
use crate::router::RoutingMode;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened(active: usize) {
        CONNECTIONS_OPENED.inc();
        CONNECTIONS_ACTIVE.set(active as i64);
    }

    pub fn record_closed(reason: &str, active: usize, duration_secs: f64) {
        CONNECTIONS_CLOSED.inc();
        CONNECTIONS_ACTIVE.set(active as i64);
        DISCONNECTS_TOTAL.with_label_values(&[reason]).inc();
        CONNECTION_DURATION.observe(duration_secs);
    }
}

/// Helper struct for recording routing metrics
pub struct RouteMetrics;

impl RouteMetrics {
    pub fn record_routed(mode: RoutingMode) {
        MESSAGES_ROUTED_TOTAL.with_label_values(&[mode.as_str()]).inc();
    }

    pub fn record_delivered(count: u64) {
        DELIVERIES_TOTAL.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        DELIVERY_FAILURES_TOTAL.inc_by(count);
    }

    pub fn record_error(kind: &str) {
        ROUTE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_probe() {
        HEARTBEAT_PROBES_TOTAL.inc();
    }

    pub fn record_ack() {
        HEARTBEAT_ACKS_TOTAL.inc();
    }
}
