use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Replication error: {0}")]
    Replication(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for DbError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DbError::Timeout(e.to_string())
        } else {
            DbError::Network(e.to_string())
        }
    }
}

impl From<chrono::ParseError> for DbError {
    fn from(e: chrono::ParseError) -> Self {
        DbError::Validation(format!("invalid timestamp: {e}"))
    }
}

// Maps error kinds to HTTP status per the documented taxonomy: validation/invalid
// request -> 400, not found -> 404, conflict -> 409, everything else -> 500.
impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        let status = match &self {
            DbError::Validation(_) | DbError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DbError::NotFound(_) => StatusCode::NOT_FOUND,
            DbError::Conflict(_) => StatusCode::CONFLICT,
            DbError::StoreUnavailable(_)
            | DbError::Replication(_)
            | DbError::Serialization(_)
            | DbError::Network(_)
            | DbError::Timeout(_)
            | DbError::Configuration(_)
            | DbError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
