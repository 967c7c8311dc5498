use axum::{routing::get, Router};

use crate::server::AppState;

use super::connection::{get_connection, list_connections};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/connections", get(list_connections))
                .route("/connections/{id}", get(get_connection)),
        )
}
