//! Gateway error types

use thiserror::Error;

/// Errors that can occur talking to the trip server
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Check if an HTTP status code is worth retrying
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Http { status, .. } => Self::is_retryable_status(*status),
            GatewayError::Network(_) => true,
            GatewayError::InvalidResponse(_) => false,
            GatewayError::Json(_) => false,
        }
    }

    /// HTTP status, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Http { status, .. } => Some(*status),
            GatewayError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
