use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

pub type WardenResult<T> = Result<T, WardenError>;

/// Subsystem error type.
///
/// Rate-limit checks and revocation fail closed: a `Store` error must be
/// treated by callers as "deny" / "not yet safe", never as success.
#[derive(Error, Debug)]
pub enum WardenError {
    // ===== Store Errors =====
    #[error("Redis error: {0}")]
    Store(#[from] redis::RedisError),

    // ===== Serialization Errors =====
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Policy Rejections =====
    #[error("Rate limit exceeded: maximum {limit} attempts per window")]
    RateLimited { limit: u32 },

    #[error("Session expired")]
    SessionExpired,

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WardenError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            WardenError::SessionExpired => StatusCode::UNAUTHORIZED,
            WardenError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            WardenError::Store(_) | WardenError::Json(_) | WardenError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            WardenError::SessionExpired => "Session expired, please sign in again".to_string(),
            WardenError::RateLimited { limit } => {
                format!("Rate limit exceeded: maximum {} attempts per window", limit)
            }
            WardenError::Store(_) => "Session store error".to_string(),
            WardenError::Json(_) => "Invalid session data".to_string(),
            WardenError::Config(msg) => format!("Configuration error: {}", msg),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            WardenError::SessionExpired => "SESSION_EXPIRED",
            WardenError::RateLimited { .. } => "RATE_LIMITED",
            WardenError::Store(_) => "STORE_ERROR",
            WardenError::Json(_) => "SERIALIZATION_ERROR",
            WardenError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                error = %self,
                error_code = %code,
                "Authentication expired"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Request rejected"
            );
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        WardenError::Config(msg.into())
    }
}

impl IntoResponse for WardenError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let error_code = self.error_code();

        // For server errors, don't expose internal details to client
        let response_body = if status.is_server_error() {
            json!({
                "error": "Internal server error",
                "error_code": error_code,
                "status": status.as_u16(),
            })
        } else {
            json!({
                "error": self.user_message(),
                "error_code": error_code,
                "status": status.as_u16(),
            })
        };

        (status, axum::Json(response_body)).into_response()
    }
}
