// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status and a machine-readable code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    code: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert vodgate_core errors to HTTP errors
impl From<vodgate_core::Error> for AppError {
    fn from(err: vodgate_core::Error) -> Self {
        use vodgate_core::Error;

        match err {
            Error::InvalidInput(msg) => AppError::bad_request(msg),
            Error::TokenInvalid(msg) => {
                AppError::new(StatusCode::UNAUTHORIZED, "TOKEN_INVALID", msg)
            }
            Error::TokenExpired => AppError::new(
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "Capability token has expired",
            ),
            Error::AccessDenied(msg) => AppError::new(StatusCode::FORBIDDEN, "ACCESS_DENIED", msg),
            Error::UpstreamExhausted { attempts, last } => {
                tracing::warn!(attempts, last = %last, "upstream exhausted");
                AppError::new(
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_EXHAUSTED",
                    "All upstream attempts failed",
                )
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal server error",
                )
            }
        }
    }
}

/// Convert anyhow errors to HTTP errors. Anything unhandled on the proxy
/// path reads as an upstream failure to the player.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Unhandled proxy error: {err}");
        AppError::bad_gateway("Proxy failure")
    }
}
