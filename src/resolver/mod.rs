//! Identifier resolution for provider and model references.
//!
//! Callers hand the gateway whatever they received: numbers, numeric strings,
//! slugs in any case, or nothing at all. [`ProviderRef`] captures that input
//! once at the boundary and [`IdentifierResolver`] turns it into a canonical
//! [`ProviderId`]. Resolution never fails; every fallback is logged.

use crate::store::{Database, ModelRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical provider identifier. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(i64);

impl ProviderId {
    /// The platform's primary provider.
    pub const PRIMARY: ProviderId = ProviderId(1);

    /// Wrap a raw id, rejecting zero and negatives.
    pub fn new(id: i64) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raw identifier as received at the boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ProviderRef {
    #[default]
    Missing,
    Number(f64),
    Text(String),
    /// Arrays, objects and booleans
    Other,
}

impl ProviderRef {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Missing,
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Other),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            _ => Self::Other,
        }
    }

    /// Interpret as a positive integer id when the input is numeric.
    ///
    /// Only finite, integral values in `1..=i32::MAX` qualify.
    pub fn as_numeric_id(&self) -> Option<i64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if n.is_finite() && n.fract() == 0.0 && n >= 1.0 && n <= i32::MAX as f64 {
            Some(n as i64)
        } else {
            None
        }
    }

    /// The trimmed text, if this is a non-empty string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.trim()).filter(|s| !s.is_empty()),
            _ => None,
        }
    }
}

impl From<i64> for ProviderRef {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for ProviderRef {
    fn from(n: i32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<f64> for ProviderRef {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for ProviderRef {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ProviderRef {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<ProviderId> for ProviderRef {
    fn from(id: ProviderId) -> Self {
        Self::Number(id.get() as f64)
    }
}

impl<T: Into<ProviderRef>> From<Option<T>> for ProviderRef {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Missing)
    }
}

/// A model reference as received at the boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ModelRef {
    #[default]
    Unspecified,
    /// Let the backend pick the model.
    Auto,
    Ref(ProviderRef),
}

impl ModelRef {
    /// Build from raw input; `auto_sentinel` (case-insensitive) selects
    /// [`ModelRef::Auto`], blank text counts as unspecified.
    pub fn parse(raw: ProviderRef, auto_sentinel: &str) -> Self {
        match raw {
            ProviderRef::Missing => Self::Unspecified,
            ProviderRef::Text(ref s) if s.trim().is_empty() => Self::Unspecified,
            ProviderRef::Text(ref s) if s.trim().eq_ignore_ascii_case(auto_sentinel) => Self::Auto,
            other => Self::Ref(other),
        }
    }
}

/// Outcome of model resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSelection {
    AutoSelect,
    Model(ModelRecord),
    /// A named model outside the catalogue, sent to the backend as given.
    Named(String),
}

impl ModelSelection {
    pub fn model(&self) -> Option<&ModelRecord> {
        match self {
            Self::Model(model) => Some(model),
            Self::AutoSelect | Self::Named(_) => None,
        }
    }

    /// Slug to send to the backend; `None` lets the backend choose.
    pub fn slug(&self) -> Option<&str> {
        match self {
            Self::AutoSelect => None,
            Self::Model(model) => Some(&model.slug),
            Self::Named(slug) => Some(slug),
        }
    }
}

/// Built-in slugs and aliases, checked before the store.
const STATIC_SLUGS: &[(&str, i64)] = &[
    ("openai", 1),
    ("anthropic", 2),
    ("claude", 2),
    ("google", 3),
    ("gemini", 3),
    ("mistral", 4),
    ("groq", 5),
];

/// Static table lookup, case-insensitive.
pub fn static_provider_id(slug: &str) -> Option<ProviderId> {
    let slug = slug.trim();
    STATIC_SLUGS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(slug))
        .map(|(_, id)| ProviderId(*id))
}

/// Canonical slug for a built-in provider id (first entry wins over aliases).
pub fn static_provider_slug(id: ProviderId) -> Option<&'static str> {
    STATIC_SLUGS
        .iter()
        .find(|(_, sid)| *sid == id.get())
        .map(|(name, _)| *name)
}

/// Resolves provider and model references against the static table and the
/// reference tables in the store.
#[derive(Clone)]
pub struct IdentifierResolver {
    db: Database,
    default_provider: ProviderId,
}

impl IdentifierResolver {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            default_provider: ProviderId::PRIMARY,
        }
    }

    /// Override the provider used when nothing else matches.
    pub fn with_default_provider(mut self, id: ProviderId) -> Self {
        self.default_provider = id;
        self
    }

    pub fn default_provider(&self) -> ProviderId {
        self.default_provider
    }

    /// Resolve any provider reference to a provider id. Never fails.
    pub async fn resolve_provider_id(&self, input: &ProviderRef) -> ProviderId {
        if let Some(id) = input.as_text().and_then(static_provider_id) {
            return id;
        }

        if let Some(id) = input.as_numeric_id().and_then(ProviderId::new) {
            return id;
        }

        if let Some(slug) = input.as_text() {
            match self.db.provider_by_slug(slug).await {
                Ok(Some(provider)) => {
                    if let Some(id) = ProviderId::new(provider.id) {
                        return id;
                    }
                }
                Ok(None) => {
                    tracing::debug!(slug, "Unknown provider slug, using default provider");
                }
                Err(e) => {
                    tracing::debug!(slug, error = %e, "Provider lookup failed, using default provider");
                }
            }
        } else {
            tracing::debug!(input = ?input, "Unusable provider reference, using default provider");
        }

        self.default_provider
    }

    /// Resolve a model for a provider.
    ///
    /// `Auto` defers to the backend. Anything that does not resolve to a
    /// model of this provider falls back to its first active model, or to
    /// backend auto-selection when it has none.
    pub async fn resolve_model(&self, provider: ProviderId, model: &ModelRef) -> ModelSelection {
        let raw = match model {
            ModelRef::Auto => return ModelSelection::AutoSelect,
            ModelRef::Unspecified => None,
            ModelRef::Ref(raw) => Some(raw),
        };

        if let Some(raw) = raw {
            if let Some(found) = self.lookup_model(provider, raw).await {
                return ModelSelection::Model(found);
            }
            tracing::debug!(
                provider = %provider,
                model = ?raw,
                "Model reference did not resolve, using first active model"
            );
        }

        match self.db.first_active_model(provider.get()).await {
            Ok(Some(model)) => ModelSelection::Model(model),
            Ok(None) => ModelSelection::AutoSelect,
            Err(e) => {
                tracing::debug!(provider = %provider, error = %e, "Model lookup failed, deferring to backend");
                ModelSelection::AutoSelect
            }
        }
    }

    /// Resolve an embedding model for a provider.
    ///
    /// Unlike [`resolve_model`](Self::resolve_model) this never falls back
    /// to the provider's first active model, which is a chat model. A named
    /// model outside the catalogue is passed through by slug.
    pub async fn resolve_embedding_model(
        &self,
        provider: ProviderId,
        model: &ModelRef,
    ) -> ModelSelection {
        let raw = match model {
            ModelRef::Auto | ModelRef::Unspecified => return ModelSelection::AutoSelect,
            ModelRef::Ref(raw) => raw,
        };
        if let Some(found) = self.lookup_model(provider, raw).await {
            return ModelSelection::Model(found);
        }
        match raw.as_text() {
            Some(slug) if raw.as_numeric_id().is_none() => {
                tracing::debug!(provider = %provider, model = slug, "Embedding model not in catalogue, passing through");
                ModelSelection::Named(slug.to_string())
            }
            _ => {
                tracing::debug!(provider = %provider, model = ?raw, "Unusable embedding model reference, deferring to backend");
                ModelSelection::AutoSelect
            }
        }
    }

    async fn lookup_model(&self, provider: ProviderId, raw: &ProviderRef) -> Option<ModelRecord> {
        if let Some(id) = raw.as_numeric_id() {
            if let Ok(Some(model)) = self.db.model_by_id(id).await {
                if model.provider_id == provider.get() {
                    return Some(model);
                }
            }
        }
        let slug = raw.as_text()?;
        self.db
            .model_by_slug(provider.get(), slug)
            .await
            .ok()
            .flatten()
    }

    /// Human-readable slug for a provider id.
    pub async fn provider_slug(&self, id: ProviderId) -> String {
        match self.db.provider_by_id(id.get()).await {
            Ok(Some(provider)) => provider.slug,
            _ => static_provider_slug(id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("provider-{}", id)),
        }
    }

    /// Human-readable slug for a model reference: numeric ids are looked up,
    /// anything else is passed through trimmed.
    pub async fn model_slug(&self, model: &str) -> String {
        let raw = ProviderRef::Text(model.to_string());
        if let Some(id) = raw.as_numeric_id() {
            if let Ok(Some(found)) = self.db.model_by_id(id).await {
                return found.slug;
            }
        }
        model.trim().to_string()
    }
}
