use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Failures of the relay core. All of them are local to the connection(s)
/// involved; none is fatal to the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("delivery to {recipient} failed: {source}")]
    DeliveryFailed {
        recipient: String,
        #[source]
        source: TransportError,
    },

    #[error("liveness probe failed: {0}")]
    ProbeFailed(TransportError),

    #[error("no liveness acknowledgment for {} ms", .idle.as_millis())]
    StaleConnection { idle: Duration },

    #[error("read failed: {0}")]
    ReadFailed(TransportError),

    #[error("identity already registered: {0}")]
    DuplicateIdentity(String),

    #[error("connection {0} is already torn down")]
    ConnectionClosed(String),
}

impl RelayError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownRecipient(_) => "unknown_recipient",
            Self::MalformedMessage(_) => "malformed_message",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::ProbeFailed(_) => "probe_failed",
            Self::StaleConnection { .. } => "stale_connection",
            Self::ReadFailed(_) => "read_failed",
            Self::DuplicateIdentity(_) => "duplicate_identity",
            Self::ConnectionClosed(_) => "connection_closed",
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedMessage(e.to_string())
    }
}

/// Errors surfaced through the HTTP API
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Configuration error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "CONNECTION_NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = if is_production() {
                    "Internal server error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, log_msg)
            }
        };

        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::debug!(code = %code, message = %log_message, "API request rejected");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
