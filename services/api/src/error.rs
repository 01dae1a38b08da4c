//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and how core
//! errors are turned into HTTP responses.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use training_core::{
    chat::ChatError, planning::PlanningError, ports::PortError, propagate::PlanStatusError,
    reconcile::ReconcileError,
};
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

//=========================================================================================
// HTTP Mapping
//=========================================================================================

/// An error already shaped for an HTTP response.
#[derive(Debug)]
pub enum HttpError {
    Status(StatusCode, String),
    /// Field-scoped validation messages, rendered as a JSON object.
    Fields(serde_json::Value),
}

pub type HttpResult<T> = Result<T, HttpError>;

impl HttpError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        HttpError::Status(StatusCode::BAD_REQUEST, msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        HttpError::Status(StatusCode::NOT_FOUND, msg.into())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::Status(status, msg) => (status, msg).into_response(),
            HttpError::Fields(fields) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(fields)).into_response()
            }
        }
    }
}

impl From<PortError> for HttpError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(msg) => HttpError::Status(StatusCode::NOT_FOUND, msg),
            PortError::Unauthorized => {
                HttpError::Status(StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            other => {
                error!("Request failed: {:?}", other);
                HttpError::Status(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<ReconcileError> for HttpError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Validation(errors) => {
                HttpError::Fields(serde_json::json!({ "errors": errors.fields }))
            }
            ReconcileError::NoSuchStep { .. } => HttpError::not_found(e.to_string()),
            ReconcileError::NoSavedSession | ReconcileError::ReadOnly => {
                HttpError::Status(StatusCode::CONFLICT, e.to_string())
            }
            ReconcileError::Port(port) => port.into(),
        }
    }
}

impl From<PlanningError> for HttpError {
    fn from(e: PlanningError) -> Self {
        match e {
            PlanningError::InvalidRequest(msg) => {
                HttpError::Status(StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            PlanningError::UnknownDog(_) => HttpError::not_found(e.to_string()),
            PlanningError::Generation(_) | PlanningError::InvalidPlan(_) => {
                error!("Plan creation failed: {}", e);
                HttpError::Status(StatusCode::BAD_GATEWAY, e.to_string())
            }
            PlanningError::Persistence(port) => port.into(),
        }
    }
}

impl From<PlanStatusError> for HttpError {
    fn from(e: PlanStatusError) -> Self {
        match e {
            PlanStatusError::Backward { .. } => HttpError::Status(StatusCode::CONFLICT, e.to_string()),
            PlanStatusError::Port(port) => port.into(),
        }
    }
}

impl From<ChatError> for HttpError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyMessage => HttpError::bad_request(e.to_string()),
            ChatError::Port(port) => port.into(),
        }
    }
}
