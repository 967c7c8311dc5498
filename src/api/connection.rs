//! Live connection listing endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::connection_manager::ConnectionInfo;
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ConnectionListResponse {
    pub connections: Vec<ConnectionInfo>,
    pub total_connections: usize,
}

/// GET /api/v1/connections - Who is online, in join order
pub async fn list_connections(State(state): State<AppState>) -> Json<ConnectionListResponse> {
    let connections = state.registry.list();
    let total = connections.len();

    Json(ConnectionListResponse {
        connections,
        total_connections: total,
    })
}

/// GET /api/v1/connections/{id} - Details of one live connection
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionInfo>> {
    state
        .registry
        .lookup(&id)
        .map(|handle| Json(ConnectionInfo::from(handle.as_ref())))
        .ok_or_else(|| AppError::NotFound(format!("Connection '{}' is not connected", id)))
}
