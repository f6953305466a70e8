//! Server error type with HTTP status mapping.
//!
//! Wraps the core taxonomy and renders the JSON error envelope. Storage
//! errors are logged here and reduced to a generic message for callers;
//! the `_links` block is injected by the envelope middleware, which knows
//! the request URI.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rserv_core::error::Error as CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Server-level errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Store, graph, or query error
    #[error("{0}")]
    Core(#[from] CoreError),

    /// Request body was missing or not valid JSON
    #[error("{0}")]
    BadRequest(String),

    /// A disabled feature was requested
    #[error("{0}")]
    Disabled(String),

    /// A stored failure replayed from the job table
    #[error("{message}")]
    Job {
        /// HTTP status the original failure mapped to
        status_code: u16,
        /// The stored message
        message: String,
    },
}

impl ServerError {
    /// Missing or empty request body.
    pub fn no_input() -> Self {
        ServerError::BadRequest("No input data provided".to_string())
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Core(core) => StatusCode::from_u16(core.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Disabled(_) => StatusCode::BAD_REQUEST,
            ServerError::Job { status_code, .. } => StatusCode::from_u16(*status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage failures reduce to a generic message at the boundary
        let message = match &self {
            ServerError::Core(CoreError::Storage(detail)) => {
                error!(detail, "storage error");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut error_body = json!({
            "message": message,
            "status_code": status.as_u16(),
        });
        if let ServerError::Core(core) = &self {
            if let Some(details) = core.details() {
                error_body["details"] = json!(details);
            }
        }

        (status, Json(json!({ "error": error_body }))).into_response()
    }
}

/// Result alias for handlers.
pub type Result<T> = std::result::Result<T, ServerError>;
