//! Database and vault configuration

use serde::{Deserialize, Serialize};

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// File path, or ":memory:" for a throwaway store
    pub path: String,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "relay.db".to_string(),
        }
    }
}

/// Credential vault settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Environment variable holding the process-wide encryption secret
    pub secret_env: String,
    /// Provider id used when a provider reference cannot be resolved
    pub default_provider_id: i64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            secret_env: "RELAY_ENCRYPTION_SECRET".to_string(),
            default_provider_id: 1,
        }
    }
}
