//! Error types for the Matrix client.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while talking to a Matrix homeserver.
#[derive(Error, Debug)]
pub enum MatrixError {
    /// Configuration error (missing or malformed value).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The access token was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The room does not exist or the bot cannot post into it.
    #[error("Room error: {0}")]
    Room(String),

    /// Any other error reported by the homeserver.
    #[error("Matrix API error: {0}")]
    Api(String),

    /// The homeserver asked us to slow down.
    #[error("Rate limited: retry after {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds to wait before retrying.
        retry_after_ms: u64,
    },

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<reqwest::Error> for MatrixError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MatrixError::Timeout(err.to_string())
        } else if err.is_connect() {
            MatrixError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            MatrixError::Json(err.to_string())
        } else {
            MatrixError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MatrixError {
    fn from(err: serde_json::Error) -> Self {
        MatrixError::Json(err.to_string())
    }
}

/// Result type for Matrix operations.
pub type MatrixResult<T> = std::result::Result<T, MatrixError>;

/// Standard Matrix error body (`{"errcode": "...", "error": "..."}`).
#[derive(Debug, Clone, Deserialize)]
pub struct MatrixApiError {
    /// Error code, e.g. `M_FORBIDDEN`.
    pub errcode: String,
    /// Human-readable message.
    #[serde(default)]
    pub error: String,
    /// Only present on `M_LIMIT_EXCEEDED`.
    #[serde(default)]
    pub retry_after_ms: Option<u64>,
}

impl MatrixApiError {
    /// Create a new API error.
    pub fn new(errcode: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            errcode: errcode.into(),
            error: error.into(),
            retry_after_ms: None,
        }
    }
}

impl From<MatrixApiError> for MatrixError {
    fn from(err: MatrixApiError) -> Self {
        match err.errcode.as_str() {
            "M_LIMIT_EXCEEDED" => MatrixError::RateLimited {
                retry_after_ms: err.retry_after_ms.unwrap_or(5_000),
            },
            "M_UNKNOWN_TOKEN" | "M_MISSING_TOKEN" | "M_FORBIDDEN" => MatrixError::Auth(err.error),
            "M_NOT_FOUND" => MatrixError::Room(err.error),
            _ => MatrixError::Api(format!("{}: {}", err.errcode, err.error)),
        }
    }
}
