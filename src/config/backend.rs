//! External inference backend configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the external inference backend.
///
/// Every outbound call carries its own deadline; there is no unbounded call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the inference service (e.g., "http://localhost:8001")
    pub url: String,
    /// Deadline for chat completion calls
    pub chat_timeout_ms: u64,
    /// Deadline for embedding calls
    pub embedding_timeout_ms: u64,
    /// Deadline for provider registration calls
    pub registration_timeout_ms: u64,
    /// Deadline for health checks
    pub health_timeout_ms: u64,
}

impl BackendConfig {
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_millis(self.chat_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8001".to_string(),
            chat_timeout_ms: 60_000,
            embedding_timeout_ms: 15_000,
            registration_timeout_ms: 5_000,
            health_timeout_ms: 5_000,
        }
    }
}
