//! Usage metering ledger.
//!
//! Token consumption is aggregated per (tenant, UTC date, metric type,
//! source) with a single upsert statement. Metering never fails the caller:
//! invalid input is skipped and store errors are logged and swallowed.

use crate::resolver::{IdentifierResolver, ProviderId};
use crate::store::{Database, StoreError, UsageIncrement, UsageMetricRow};
use crate::vault::CredentialSource;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::fmt;
use tracing::instrument;

pub use crate::dispatch::normalize::extract_token_count;

/// Metric type for all token counters.
pub const TOKENS_METRIC: &str = "llm_tokens_used";

/// Which gateway operation consumed the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSource {
    Chat,
    Embedding,
    Answer,
    Generation,
}

impl UsageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Embedding => "embedding",
            Self::Answer => "answer",
            Self::Generation => "generation",
        }
    }
}

impl fmt::Display for UsageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whose key paid for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialType {
    Tenant,
    Environment,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Environment => "environment",
        }
    }
}

impl From<CredentialSource> for CredentialType {
    fn from(source: CredentialSource) -> Self {
        match source {
            CredentialSource::Tenant(_) => Self::Tenant,
            CredentialSource::Environment => Self::Environment,
        }
    }
}

/// Attribution recorded alongside a usage increment.
#[derive(Debug, Clone)]
pub struct UsageContext {
    pub provider: ProviderId,
    /// Model slug or id as the backend reported it
    pub model: Option<String>,
    pub credential_type: CredentialType,
    pub source: UsageSource,
}

/// Today's aggregate date key (UTC).
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Clone)]
pub struct UsageLedger {
    db: Database,
    resolver: IdentifierResolver,
}

impl UsageLedger {
    pub fn new(db: Database, resolver: IdentifierResolver) -> Self {
        Self { db, resolver }
    }

    /// Add `tokens` to today's aggregate for the tenant and source.
    ///
    /// Returns the new aggregate value, or `None` when the increment was
    /// skipped or could not be stored.
    #[instrument(skip(self, context), fields(source = %context.source))]
    pub async fn record_usage(
        &self,
        tenant_id: i64,
        tokens: i64,
        context: &UsageContext,
    ) -> Option<i64> {
        if tenant_id <= 0 {
            tracing::debug!("Skipping usage record for invalid tenant id");
            return None;
        }
        if tokens <= 0 {
            tracing::debug!(tokens, "Skipping usage record without tokens");
            return None;
        }

        let provider = self.resolver.provider_slug(context.provider).await;
        let model = match context.model.as_deref() {
            Some(model) if !model.trim().is_empty() => Some(self.resolver.model_slug(model).await),
            _ => None,
        };

        let increment = UsageIncrement {
            tenant_id,
            date: date_key(today()),
            metric_type: TOKENS_METRIC.to_string(),
            source: context.source.as_str().to_string(),
            value: tokens,
            metadata: json!({
                "provider": provider,
                "model": model,
                "credential_type": context.credential_type.as_str(),
            }),
        };

        match self.db.increment_usage(increment).await {
            Ok(total) => {
                metrics::counter!(
                    "relay_tokens_recorded_total",
                    "source" => context.source.as_str()
                )
                .increment(tokens as u64);
                tracing::debug!(tokens, total, provider = %provider, "Recorded token usage");
                Some(total)
            }
            Err(e) => {
                tracing::warn!(error = %e, tokens, "Failed to record token usage");
                None
            }
        }
    }

    /// Aggregate rows for a tenant; all dates when `date` is `None`.
    pub async fn usage_for(
        &self,
        tenant_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<UsageMetricRow>, StoreError> {
        let date = date.map(date_key);
        self.db.usage_for_tenant(tenant_id, date.as_deref()).await
    }
}
