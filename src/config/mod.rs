//! Configuration module for Relay
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`RELAY_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use relay::config::RelayConfig;
//!
//! let config = RelayConfig::default();
//! assert_eq!(config.dispatch.embedding_dimensions, 1536);
//!
//! let toml = r#"
//! [backend]
//! url = "http://inference:9000"
//! "#;
//! let config: RelayConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.backend.url, "http://inference:9000");
//! ```

pub mod backend;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod providers;
pub mod storage;

pub use backend::BackendConfig;
pub use dispatch::{DispatchConfig, QualityConfig, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use providers::{default_providers, ModelConfig, ProviderConfig};
pub use storage::{DatabaseConfig, VaultConfig};

use crate::agents::AgentProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Unified configuration for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub database: DatabaseConfig,
    pub backend: BackendConfig,
    pub vault: VaultConfig,
    pub dispatch: DispatchConfig,
    pub quality: QualityConfig,
    pub logging: LoggingConfig,
    /// Provider/model reference data seeded at startup
    pub providers: Vec<ProviderConfig>,
    /// Agent profiles served by the static agent directory
    pub agents: Vec<AgentProfile>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            backend: BackendConfig::default(),
            vault: VaultConfig::default(),
            dispatch: DispatchConfig::default(),
            quality: QualityConfig::default(),
            logging: LoggingConfig::default(),
            providers: default_providers(),
            agents: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `RELAY_*` environment variable overrides.
    ///
    /// Unparseable values are ignored and the current value is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("RELAY_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(url) = std::env::var("RELAY_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Ok(level) = std::env::var("RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("RELAY_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }
        if let Ok(dims) = std::env::var("RELAY_EMBEDDING_DIMENSIONS") {
            if let Ok(d) = dims.parse() {
                self.dispatch.embedding_dimensions = d;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::invalid("database.path", "path cannot be empty"));
        }
        if self.backend.url.trim().is_empty() {
            return Err(ConfigError::invalid("backend.url", "URL cannot be empty"));
        }
        for (field, value) in [
            ("backend.chat_timeout_ms", self.backend.chat_timeout_ms),
            ("backend.embedding_timeout_ms", self.backend.embedding_timeout_ms),
            ("backend.registration_timeout_ms", self.backend.registration_timeout_ms),
            ("backend.health_timeout_ms", self.backend.health_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "timeout must be non-zero"));
            }
        }
        if self.vault.secret_env.trim().is_empty() {
            return Err(ConfigError::invalid(
                "vault.secret_env",
                "environment variable name cannot be empty",
            ));
        }
        if self.vault.default_provider_id <= 0 {
            return Err(ConfigError::invalid(
                "vault.default_provider_id",
                "default provider id must be positive",
            ));
        }
        if self.dispatch.embedding_dimensions == 0 {
            return Err(ConfigError::invalid(
                "dispatch.embedding_dimensions",
                "dimensions must be non-zero",
            ));
        }

        let mut provider_ids = HashSet::new();
        let mut model_ids = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if provider.id <= 0 {
                return Err(ConfigError::invalid(
                    format!("providers[{}].id", i),
                    "id must be positive",
                ));
            }
            if provider.slug.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("providers[{}].slug", i),
                    "slug cannot be empty",
                ));
            }
            if !provider_ids.insert(provider.id) {
                return Err(ConfigError::invalid(
                    format!("providers[{}].id", i),
                    format!("duplicate provider id {}", provider.id),
                ));
            }
            for (j, model) in provider.models.iter().enumerate() {
                if model.id <= 0 || !model_ids.insert(model.id) {
                    return Err(ConfigError::invalid(
                        format!("providers[{}].models[{}].id", i, j),
                        "model ids must be positive and unique",
                    ));
                }
            }
        }

        for (i, agent) in self.agents.iter().enumerate() {
            if !(0.0..=1.0).contains(&agent.confidence_threshold) {
                return Err(ConfigError::invalid(
                    format!("agents[{}].confidence_threshold", i),
                    "threshold must be between 0 and 1",
                ));
            }
        }

        Ok(())
    }
}
