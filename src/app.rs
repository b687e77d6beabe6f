//! Gateway wiring.
//!
//! [`Gateway`] is built once at startup from a [`RelayConfig`] and owns every
//! long-lived component. Collaborators outside the gateway's concern (the
//! backend client, context retrieval, unanswered-question detection) can be
//! swapped through [`GatewayBuilder`].

use crate::agents::{AgentDirectory, ContextRetriever, NoContext, StaticAgentDirectory};
use crate::backend::{HttpBackend, InferenceBackend};
use crate::config::RelayConfig;
use crate::dispatch::Dispatcher;
use crate::generation::ContinuousGenerator;
use crate::metering::UsageLedger;
use crate::quality::{AnswerQualityGate, HeuristicDetector, UnansweredDetector};
use crate::resolver::{IdentifierResolver, ProviderId};
use crate::store::{Database, StoreError};
use crate::vault::{CredentialVault, EnvCredentials, KeyCipher, VaultError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Failed to open database: {0}")]
    Store(#[from] StoreError),

    #[error("Encryption secret not set (expected environment variable {0})")]
    MissingSecret(String),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// All gateway components, constructed once and shared by clone.
#[derive(Clone)]
pub struct Gateway {
    pub config: Arc<RelayConfig>,
    pub db: Database,
    pub resolver: IdentifierResolver,
    pub vault: CredentialVault,
    pub ledger: UsageLedger,
    pub dispatcher: Dispatcher,
    pub generator: ContinuousGenerator,
    pub agents: Arc<StaticAgentDirectory>,
}

impl Gateway {
    /// Build with default collaborators: HTTP backend, environment
    /// credentials, no context retrieval and the heuristic detector.
    pub async fn from_config(config: RelayConfig) -> Result<Self, InitError> {
        GatewayBuilder::new(config).build().await
    }

    pub fn builder(config: RelayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }
}

pub struct GatewayBuilder {
    config: RelayConfig,
    backend: Option<Arc<dyn InferenceBackend>>,
    env: Option<EnvCredentials>,
    secret: Option<String>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    detector: Option<Arc<dyn UnansweredDetector>>,
    database: Option<Database>,
}

impl GatewayBuilder {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            backend: None,
            env: None,
            secret: None,
            retriever: None,
            detector: None,
            database: None,
        }
    }

    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use these environment credentials instead of reading the process
    /// environment.
    pub fn env_credentials(mut self, env: EnvCredentials) -> Self {
        self.env = Some(env);
        self
    }

    /// Use this encryption secret instead of the configured variable.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn UnansweredDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Reuse an already open database.
    pub fn database(mut self, db: Database) -> Self {
        self.database = Some(db);
        self
    }

    pub async fn build(self) -> Result<Gateway, InitError> {
        let config = self.config;
        config.validate()?;

        let db = match self.database {
            Some(db) => db,
            None if config.database.is_in_memory() => Database::in_memory().await?,
            None => Database::open(&config.database.path).await?,
        };
        for provider in &config.providers {
            db.upsert_provider(provider).await?;
        }

        let secret = match self.secret {
            Some(secret) => secret,
            None => std::env::var(&config.vault.secret_env)
                .map_err(|_| InitError::MissingSecret(config.vault.secret_env.clone()))?,
        };
        let cipher = KeyCipher::from_secret(&secret)?;
        let env = Arc::new(self.env.unwrap_or_else(EnvCredentials::from_env));

        let mut resolver = IdentifierResolver::new(db.clone());
        if let Some(id) = ProviderId::new(config.vault.default_provider_id) {
            resolver = resolver.with_default_provider(id);
        }

        let vault = CredentialVault::new(db.clone(), cipher, env, resolver.clone());
        let ledger = UsageLedger::new(db.clone(), resolver.clone());

        let detector = self.detector.unwrap_or_else(|| {
            Arc::new(HeuristicDetector::new(db.clone(), config.quality.clone()))
        });
        let gate = AnswerQualityGate::new(detector);

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(HttpBackend::new(config.backend.clone())));

        let dispatcher = Dispatcher::new(
            db.clone(),
            resolver.clone(),
            vault.clone(),
            backend,
            ledger.clone(),
            gate,
            config.dispatch.clone(),
        )
        .with_content_logging(config.logging.enable_content_logging);

        let agents = Arc::new(StaticAgentDirectory::new(config.agents.clone()));
        let retriever = self.retriever.unwrap_or_else(|| Arc::new(NoContext));
        let generator = ContinuousGenerator::new(
            dispatcher.clone(),
            Arc::clone(&agents) as Arc<dyn AgentDirectory>,
            retriever,
        );

        tracing::info!(
            providers = config.providers.len(),
            agents = agents.len(),
            backend = %config.backend.url,
            "Gateway initialized"
        );

        Ok(Gateway {
            config: Arc::new(config),
            db,
            resolver,
            vault,
            ledger,
            dispatcher,
            generator,
            agents,
        })
    }
}
