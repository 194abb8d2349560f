//! Realtime channel error types

use std::time::Duration;
use thiserror::Error;

/// Errors from the realtime channel
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),

    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Channel is not open")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
