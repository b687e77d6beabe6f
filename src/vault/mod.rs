//! Credential vault: per-tenant provider API keys.
//!
//! Keys are encrypted at rest ([`crypto::KeyCipher`]), deduplicated by a
//! SHA-256 hash of the plaintext, and exactly one key per (tenant, provider)
//! may be the default. When a tenant has no usable default, a process-wide
//! environment key for the provider is used instead ([`EnvCredentials`]).

pub mod crypto;
mod error;

pub use crypto::{key_hash, KeyCipher};
pub use error::VaultError;

use crate::resolver::{IdentifierResolver, ProviderId};
use crate::store::{Database, NewCredentialRow, RevokeOutcome, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;

const MASK: &str = "********";

/// Mask a key for display: first 4 and last 4 characters around a fixed
/// mask. Keys of 8 characters or fewer are fully masked.
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return MASK.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, MASK, tail)
}

/// Process-wide provider keys read once from the environment.
///
/// `<SLUG>_API_KEY` supplies a fallback key; `<SLUG>_EMBEDDINGS_KEYLESS`
/// (any value) allows keyless embedding calls for that provider.
#[derive(Clone, Default)]
pub struct EnvCredentials {
    keys: HashMap<String, String>,
    keyless_embeddings: HashSet<String>,
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("providers", &self.keys.keys().collect::<Vec<_>>())
            .field("keyless_embeddings", &self.keyless_embeddings)
            .finish()
    }
}

impl EnvCredentials {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from an explicit variable list.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut env = Self::default();
        for (name, value) in vars {
            if let Some(slug) = name.strip_suffix("_API_KEY") {
                if !slug.is_empty() && !value.trim().is_empty() {
                    env.keys.insert(slug.to_ascii_uppercase(), value.trim().to_string());
                }
            } else if let Some(slug) = name.strip_suffix("_EMBEDDINGS_KEYLESS") {
                if !slug.is_empty() {
                    env.keyless_embeddings.insert(slug.to_ascii_uppercase());
                }
            }
        }
        env
    }

    /// Add a fallback key for a provider slug.
    pub fn with_key(mut self, slug: &str, key: impl Into<String>) -> Self {
        self.keys.insert(env_name(slug), key.into());
        self
    }

    pub fn with_keyless_embeddings(mut self, slug: &str) -> Self {
        self.keyless_embeddings.insert(env_name(slug));
        self
    }

    pub fn key_for(&self, slug: &str) -> Option<&str> {
        self.keys.get(&env_name(slug)).map(String::as_str)
    }

    pub fn allows_keyless_embeddings(&self, slug: &str) -> bool {
        self.keyless_embeddings.contains(&env_name(slug))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// `my-provider` -> `MY_PROVIDER`
fn env_name(slug: &str) -> String {
    slug.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// A key submitted by a tenant.
#[derive(Clone)]
pub struct NewCredential {
    pub tenant_id: i64,
    pub provider: ProviderId,
    pub label: String,
    pub key: String,
    pub is_default: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewCredential")
            .field("tenant_id", &self.tenant_id)
            .field("provider", &self.provider)
            .field("label", &self.label)
            .field("key", &mask(&self.key))
            .field("is_default", &self.is_default)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Tenant(i64),
    Environment,
}

impl CredentialSource {
    /// Label recorded in usage metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant(_) => "tenant",
            Self::Environment => "environment",
        }
    }

    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Environment)
    }
}

#[derive(Clone)]
pub struct ResolvedCredential {
    pub key: String,
    pub source: CredentialSource,
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("key", &mask(&self.key))
            .field("source", &self.source)
            .finish()
    }
}

/// Display row for a stored credential; never carries the plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub id: i64,
    pub provider_id: i64,
    pub provider: String,
    pub label: String,
    pub masked_key: String,
    pub is_default: bool,
    pub expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Encrypted per-tenant key storage with default selection.
#[derive(Clone)]
pub struct CredentialVault {
    db: Database,
    cipher: KeyCipher,
    env: Arc<EnvCredentials>,
    resolver: IdentifierResolver,
}

impl CredentialVault {
    pub fn new(
        db: Database,
        cipher: KeyCipher,
        env: Arc<EnvCredentials>,
        resolver: IdentifierResolver,
    ) -> Self {
        Self {
            db,
            cipher,
            env,
            resolver,
        }
    }

    pub fn env(&self) -> &EnvCredentials {
        &self.env
    }

    /// Encrypt and persist a tenant key.
    ///
    /// # Errors
    ///
    /// `DuplicateCredential` when the tenant already stored this key for the
    /// provider.
    #[instrument(skip(self, credential), fields(tenant_id = credential.tenant_id, provider = %credential.provider))]
    pub async fn store(&self, credential: NewCredential) -> Result<i64, VaultError> {
        let key = credential.key.trim();
        let row = NewCredentialRow {
            tenant_id: credential.tenant_id,
            provider_id: credential.provider.get(),
            label: credential.label.clone(),
            encrypted_key: self.cipher.encrypt(key)?,
            key_hash: key_hash(key),
            is_default: credential.is_default,
            expires_at: credential.expires_at,
        };

        let id = self.db.insert_credential(row).await.map_err(|e| match e {
            StoreError::Duplicate(_) => VaultError::DuplicateCredential {
                provider_id: credential.provider.get(),
            },
            other => VaultError::Store(other),
        })?;

        tracing::info!(
            credential_id = id,
            key = %mask(key),
            is_default = credential.is_default,
            "Stored provider credential"
        );
        Ok(id)
    }

    /// Pick the key to use for (tenant, provider).
    ///
    /// The tenant's default wins unless it has expired; otherwise the
    /// environment key for the provider's slug is used.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn resolve_default(
        &self,
        tenant_id: i64,
        provider: ProviderId,
    ) -> Result<ResolvedCredential, VaultError> {
        if let Some(record) = self.db.default_credential(tenant_id, provider.get()).await? {
            if record.is_expired(Utc::now()) {
                tracing::warn!(
                    credential_id = record.id,
                    "Default credential has expired, trying environment key"
                );
            } else {
                let key = self.cipher.decrypt(&record.encrypted_key)?;
                if let Err(e) = self.db.touch_credential(record.id).await {
                    tracing::warn!(credential_id = record.id, error = %e, "Failed to update last_used_at");
                }
                return Ok(ResolvedCredential {
                    key,
                    source: CredentialSource::Tenant(record.id),
                });
            }
        }

        let slug = self.resolver.provider_slug(provider).await;
        match self.env.key_for(&slug) {
            Some(key) => {
                tracing::debug!(slug = %slug, "Using environment credential");
                Ok(ResolvedCredential {
                    key: key.to_string(),
                    source: CredentialSource::Environment,
                })
            }
            None => Err(VaultError::NoCredentialAvailable { provider: slug }),
        }
    }

    /// Make a credential the tenant's default for its provider.
    #[instrument(skip(self))]
    pub async fn promote(&self, tenant_id: i64, credential_id: i64) -> Result<(), VaultError> {
        if !self.db.promote_credential(tenant_id, credential_id).await? {
            return Err(VaultError::CredentialNotFound(credential_id));
        }
        tracing::info!("Promoted credential to default");
        Ok(())
    }

    /// Delete a credential, handing the default to a sibling if needed.
    #[instrument(skip(self))]
    pub async fn revoke(&self, tenant_id: i64, credential_id: i64) -> Result<RevokeOutcome, VaultError> {
        let outcome = self
            .db
            .revoke_credential(tenant_id, credential_id)
            .await?
            .ok_or(VaultError::CredentialNotFound(credential_id))?;

        tracing::info!(
            was_default = outcome.was_default,
            promoted = ?outcome.promoted,
            "Revoked credential"
        );
        Ok(outcome)
    }

    /// Masked view of every credential the tenant owns.
    pub async fn list(&self, tenant_id: i64) -> Result<Vec<CredentialSummary>, VaultError> {
        let now = Utc::now();
        let mut summaries = Vec::new();
        for record in self.db.list_credentials(tenant_id).await? {
            let masked_key = match self.cipher.decrypt(&record.encrypted_key) {
                Ok(key) => mask(&key),
                Err(e) => {
                    tracing::warn!(credential_id = record.id, error = %e, "Cannot decrypt stored credential");
                    MASK.to_string()
                }
            };
            let provider = match ProviderId::new(record.provider_id) {
                Some(id) => self.resolver.provider_slug(id).await,
                None => record.provider_id.to_string(),
            };
            summaries.push(CredentialSummary {
                id: record.id,
                provider_id: record.provider_id,
                provider,
                label: record.label.clone(),
                masked_key,
                is_default: record.is_default,
                expired: record.is_expired(now),
                expires_at: record.expires_at,
                last_used_at: record.last_used_at,
                created_at: record.created_at,
            });
        }
        Ok(summaries)
    }
}
