use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Result type for limiter operations
pub type Result<T> = std::result::Result<T, LimiterError>;

/// Limiter error types
#[derive(Error, Debug)]
pub enum LimiterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decision store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Decision store did not answer within {0:?}")]
    StoreTimeout(Duration),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimiterError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            LimiterError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LimiterError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            LimiterError::StoreTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            LimiterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LimiterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error came from talking to the decision store
    pub fn is_store_failure(&self) -> bool {
        matches!(self, LimiterError::Store(_) | LimiterError::StoreTimeout(_))
    }
}

impl IntoResponse for LimiterError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Store internals never reach the client
        let message = if self.is_store_failure() {
            "service temporarily unavailable".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
