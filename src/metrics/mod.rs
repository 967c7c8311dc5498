//! Prometheus metrics for the relay service.
//!
//! - Connection metrics (live connections, opened/closed, disconnect reasons)
//! - Routing metrics (messages routed, deliveries, failures, route errors)
//! - Heartbeat metrics (probes sent)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, HeartbeatMetrics, RouteMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of live connections in the registry
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of live connections in the registry"
    ).unwrap();

    pub static ref CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total connections registered"
    ).unwrap();

    pub static ref CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total connections torn down"
    ).unwrap();

    /// Teardowns by reason
    pub static ref DISCONNECTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_disconnects_total", METRIC_PREFIX),
        "Connection teardowns by reason",
        &["reason"]
    ).unwrap();

    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Routing Metrics
    // ============================================================================

    /// Inbound messages routed, by routing mode
    pub static ref MESSAGES_ROUTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_routed_total", METRIC_PREFIX),
        "Inbound messages routed",
        &["mode"]
    ).unwrap();

    pub static ref DELIVERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Successful writes to recipient channels"
    ).unwrap();

    pub static ref DELIVERY_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Failed writes to recipient channels"
    ).unwrap();

    /// Route errors by kind (unknown recipient, malformed message, ...)
    pub static ref ROUTE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_route_errors_total", METRIC_PREFIX),
        "Route errors by kind",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    pub static ref HEARTBEAT_PROBES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_probes_total", METRIC_PREFIX),
        "Liveness probes sent"
    ).unwrap();

    pub static ref HEARTBEAT_ACKS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_acks_total", METRIC_PREFIX),
        "Liveness acknowledgments received"
    ).unwrap();
}
