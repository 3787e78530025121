//! Registry error types and their HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Registry-level errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("security validation failed: {0}")]
    SecurityValidation(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Store(err.to_string())
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RegistryError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone())
            }
            RegistryError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{what} not found"),
            ),
            RegistryError::SecurityValidation(msg) => (
                StatusCode::BAD_REQUEST,
                "SECURITY_VALIDATION",
                msg.clone(),
            ),
            RegistryError::Store(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_FAILURE",
                msg.clone(),
            ),
            RegistryError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
            ),
        };

        let body = Json(json!({
            "status": "error",
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
