//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection_manager::ConnectionStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub routing_mode: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub routing_mode: String,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.registry.len(),
        routing_mode: state.router.mode().as_str().to_string(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let ws = &state.settings.websocket;

    Json(StatsResponse {
        connections: state.registry.stats(),
        routing_mode: state.router.mode().as_str().to_string(),
        ping_interval_secs: ws.ping_interval().as_secs(),
        pong_timeout_secs: ws.pong_timeout().as_secs(),
    })
}
