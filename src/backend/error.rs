//! Error types for inference backend calls.

use thiserror::Error;

/// Errors that can occur when calling the inference backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Request exceeded its per-call deadline.
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Network connectivity error (DNS, connection refused, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Backend returned an error response (4xx, 5xx).
    #[error("Backend error {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// Backend response is not JSON.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Transport failures worth retrying for idempotent calls.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }
}
