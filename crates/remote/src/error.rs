//! Error types for the remote client crate.

use fieldsync_core::errors::RemoteError;
use thiserror::Error;

/// Result type alias for remote client operations.
pub type Result<T> = std::result::Result<T, RemoteClientError>;

#[derive(Debug, Error)]
pub enum RemoteClientError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the field-data service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteClientError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Map onto the engine's error type. `timeout_ms` is the client's request
    /// timeout, reported when the transport timed out.
    pub fn into_remote_error(self, operation: &str, timeout_ms: u64) -> RemoteError {
        match self {
            Self::Http(err) if err.is_timeout() => RemoteError::timeout(operation, timeout_ms),
            Self::Http(err) if err.is_decode() => RemoteError::Decode(err.to_string()),
            Self::Http(err) => RemoteError::Network(err.to_string()),
            Self::Json(err) => RemoteError::Decode(err.to_string()),
            Self::Api { status, message } => RemoteError::Api { status, message },
            Self::InvalidRequest(msg) => RemoteError::InvalidRequest(msg),
            Self::Auth(msg) => RemoteError::api(401, msg),
        }
    }
}
