//! Inference dispatcher.
//!
//! Every call follows the same path: resolve the provider, pick a credential,
//! resolve the model, call the backend, normalize the response and meter the
//! tokens. Answer-generation calls then pass through the quality gate.

mod error;
pub mod normalize;

pub use error::{GatewayError, GENERIC_APOLOGY};
pub use normalize::{
    NormalizedCompletion, ResponseEnvelope, TokenUsage, UsageShape, SERIALIZATION_ERROR_MARKER,
};

use crate::agents::{format_context_block, AgentProfile, ContextChunk};
use crate::backend::{
    BackendChatRequest, BackendEmbeddingRequest, BackendError, ChatMessage, InferenceBackend,
    ProviderRegistration,
};
use crate::config::DispatchConfig;
use crate::metering::{extract_token_count, CredentialType, UsageContext, UsageLedger, UsageSource};
use crate::quality::{normalize_confidence, AnswerGenerationResult, AnswerQualityGate, GateContext};
use crate::resolver::{IdentifierResolver, ModelRef, ModelSelection, ProviderId, ProviderRef};
use crate::store::Database;
use crate::vault::{CredentialVault, ResolvedCredential, VaultError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const CONTENT_PREVIEW_CHARS: usize = 120;

/// A plain chat completion.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub tenant_id: i64,
    pub provider: ProviderRef,
    pub model: ModelRef,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingRequest {
    pub tenant_id: i64,
    pub provider: ProviderRef,
    pub model: Option<String>,
    pub text: String,
}

/// One answer-generation call for an agent.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub tenant_id: i64,
    pub provider: ProviderRef,
    pub model: ModelRef,
    pub agent: AgentProfile,
    pub question: String,
    pub knowledge_base_id: Option<i64>,
    /// Retrieved knowledge-base chunks, already ranked
    pub context: Vec<ContextChunk>,
    /// Content generated so far, for multi-section output
    pub continuation_text: Option<String>,
    pub is_continuation: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub source: UsageSource,
}

impl AnswerRequest {
    pub fn new(tenant_id: i64, agent: AgentProfile, question: impl Into<String>) -> Self {
        Self {
            tenant_id,
            provider: ProviderRef::Missing,
            model: ModelRef::Unspecified,
            agent,
            question: question.into(),
            knowledge_base_id: None,
            context: Vec::new(),
            continuation_text: None,
            is_continuation: false,
            temperature: None,
            max_tokens: None,
            source: UsageSource::Answer,
        }
    }
}

/// Provider, credential and model chosen for one call.
struct Resolution {
    provider: ProviderId,
    slug: String,
    credential: Option<ResolvedCredential>,
    model: ModelSelection,
}

impl Resolution {
    fn credential_type(&self) -> CredentialType {
        self.credential
            .as_ref()
            .map(|c| c.source.into())
            .unwrap_or(CredentialType::Environment)
    }

    fn model_slug(&self) -> Option<String> {
        self.model.slug().map(str::to_string)
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    db: Database,
    resolver: IdentifierResolver,
    vault: CredentialVault,
    backend: Arc<dyn InferenceBackend>,
    ledger: UsageLedger,
    gate: AnswerQualityGate,
    config: DispatchConfig,
    content_logging: bool,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        resolver: IdentifierResolver,
        vault: CredentialVault,
        backend: Arc<dyn InferenceBackend>,
        ledger: UsageLedger,
        gate: AnswerQualityGate,
        config: DispatchConfig,
    ) -> Self {
        Self {
            db,
            resolver,
            vault,
            backend,
            ledger,
            gate,
            config,
            content_logging: false,
        }
    }

    /// Log a preview of the last user message on each dispatch.
    pub fn with_content_logging(mut self, enabled: bool) -> Self {
        self.content_logging = enabled;
        self
    }

    fn log_content(&self, message: Option<&str>) {
        if self.content_logging {
            if let Some(message) = message {
                let preview: String = message.chars().take(CONTENT_PREVIEW_CHARS).collect();
                tracing::debug!(preview = %preview, "User message");
            }
        }
    }

    async fn resolve(
        &self,
        tenant_id: i64,
        provider: &ProviderRef,
        model: &ModelRef,
    ) -> Result<Resolution, GatewayError> {
        let provider = self.resolver.resolve_provider_id(provider).await;
        let slug = self.resolver.provider_slug(provider).await;
        let credential = self.vault.resolve_default(tenant_id, provider).await?;
        let model = self.resolver.resolve_model(provider, model).await;
        Ok(Resolution {
            provider,
            slug,
            credential: Some(credential),
            model,
        })
    }

    fn chat_body(&self, resolution: &Resolution, messages: Vec<ChatMessage>) -> BackendChatRequest {
        let model = resolution.model_slug();
        BackendChatRequest {
            provider: resolution.slug.clone(),
            auto_select_model: model.is_none(),
            model,
            messages,
            api_key: resolution.credential.as_ref().map(|c| c.key.clone()),
            ..Default::default()
        }
    }

    /// Send a chat body once and normalize the reply. Serialization failures
    /// inside the backend become an apology instead of an error.
    async fn complete(
        &self,
        body: &BackendChatRequest,
        last_user_message: Option<&str>,
    ) -> Result<NormalizedCompletion, GatewayError> {
        let raw = match self.backend.chat_completion(body).await {
            Ok(raw) => raw,
            Err(BackendError::Upstream { message, .. })
                if normalize::is_serialization_failure(&message) =>
            {
                tracing::warn!(message = %message, "Backend failed to serialize its response");
                return Ok(normalize::serialization_apology(last_user_message));
            }
            Err(e) => return Err(e.into()),
        };

        match ResponseEnvelope::parse(&raw) {
            ResponseEnvelope::Completion(completion) => Ok(completion),
            ResponseEnvelope::Failure { message } if normalize::is_serialization_failure(&message) => {
                tracing::warn!(message = %message, "Backend failed to serialize its response");
                Ok(normalize::serialization_apology(last_user_message))
            }
            ResponseEnvelope::Failure { message } => Err(GatewayError::Upstream {
                status: None,
                message,
            }),
        }
    }

    async fn meter(
        &self,
        tenant_id: i64,
        tokens: i64,
        resolution: &Resolution,
        reported_model: Option<&str>,
        source: UsageSource,
    ) {
        let context = UsageContext {
            provider: resolution.provider,
            model: reported_model
                .map(str::to_string)
                .or_else(|| resolution.model_slug()),
            credential_type: resolution.credential_type(),
            source,
        };
        self.ledger.record_usage(tenant_id, tokens, &context).await;
    }

    /// Chat completion for a tenant. Never retried.
    #[instrument(skip(self, request), fields(tenant_id = request.tenant_id))]
    pub async fn chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<NormalizedCompletion, GatewayError> {
        let resolution = self
            .resolve(request.tenant_id, &request.provider, &request.model)
            .await?;
        tracing::debug!(provider = %resolution.slug, model = ?resolution.model_slug(), "Dispatching chat completion");

        let last_user = last_user_message(&request.messages).map(str::to_string);
        self.log_content(last_user.as_deref());
        let mut body = self.chat_body(&resolution, request.messages);
        body.temperature = request.temperature;
        body.max_tokens = request.max_tokens;

        let mut completion = self.complete(&body, last_user.as_deref()).await?;
        completion.provider.get_or_insert_with(|| resolution.slug.clone());
        if completion.model.is_none() {
            completion.model = resolution.model_slug();
        }

        self.meter(
            request.tenant_id,
            completion.usage.total_tokens,
            &resolution,
            completion.model.as_deref(),
            UsageSource::Chat,
        )
        .await;

        Ok(completion)
    }

    /// Embed text, validating dimensionality and finiteness.
    ///
    /// Transport failures are retried with backoff up to the configured
    /// budget. Without any credential the call goes out keyless only when
    /// the provider allows it.
    #[instrument(skip(self, request), fields(tenant_id = request.tenant_id))]
    pub async fn generate_embedding(
        &self,
        request: EmbeddingRequest,
    ) -> Result<Vec<f32>, GatewayError> {
        let provider = self.resolver.resolve_provider_id(&request.provider).await;
        let slug = self.resolver.provider_slug(provider).await;
        let credential = match self.vault.resolve_default(request.tenant_id, provider).await {
            Ok(credential) => Some(credential),
            Err(VaultError::NoCredentialAvailable { .. })
                if self.vault.env().allows_keyless_embeddings(&slug) =>
            {
                tracing::debug!(provider = %slug, "No credential, sending keyless embedding request");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let model_ref = match request.model.as_deref() {
            Some(model) => ModelRef::parse(model.into(), &self.config.auto_model_sentinel),
            None => ModelRef::Unspecified,
        };
        let model = self.resolver.resolve_embedding_model(provider, &model_ref).await;

        let resolution = Resolution {
            provider,
            slug,
            credential,
            model,
        };
        let body = BackendEmbeddingRequest {
            provider: resolution.slug.clone(),
            model: resolution.model_slug(),
            text: request.text,
            api_key: resolution.credential.as_ref().map(|c| c.key.clone()),
        };

        let raw = self.embedding_with_retry(&body).await?;
        if let ResponseEnvelope::Failure { message } = ResponseEnvelope::parse(&raw) {
            return Err(GatewayError::Upstream {
                status: None,
                message,
            });
        }

        let vector = extract_embedding(&raw, self.config.embedding_dimensions)
            .map_err(GatewayError::InvalidEmbedding)?;

        let reported_model = raw.get("model").and_then(Value::as_str);
        self.meter(
            request.tenant_id,
            extract_token_count(&raw),
            &resolution,
            reported_model,
            UsageSource::Embedding,
        )
        .await;

        Ok(vector)
    }

    async fn embedding_with_retry(&self, body: &BackendEmbeddingRequest) -> Result<Value, GatewayError> {
        let mut attempt: u32 = 0;
        loop {
            match self.backend.embedding(body).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_transport() && attempt < self.config.embedding_retries => {
                    let backoff = self.config.retry_backoff_ms.saturating_mul(1 << attempt.min(16));
                    tracing::warn!(attempt = attempt + 1, error = %e, backoff_ms = backoff, "Embedding request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Generate an agent answer and run it through the quality gate.
    #[instrument(skip(self, request), fields(tenant_id = request.tenant_id, agent_id = request.agent.id))]
    pub async fn generate_answer(
        &self,
        request: AnswerRequest,
    ) -> Result<AnswerGenerationResult, GatewayError> {
        let resolution = self
            .resolve(request.tenant_id, &request.provider, &request.model)
            .await?;

        let agent = &request.agent;
        let context_block = format_context_block(&request.context);
        let grounded = context_block.is_some();
        let skip_relevance = agent.skip_relevance_filtering && grounded;

        let messages = vec![
            ChatMessage::system(agent.system_prompt(context_block.as_deref())),
            ChatMessage::user(request.question.clone()),
        ];
        let mut body = self.chat_body(&resolution, messages);
        body.temperature = request.temperature;
        body.max_tokens = request.max_tokens;
        body.prompt_template = agent.prompt_template.clone();
        body.rules = agent.rules.clone();
        body.continuation_text = request.continuation_text.clone();
        body.is_continuation = request.is_continuation;
        body.relevance_threshold = (!skip_relevance).then_some(agent.confidence_threshold);

        self.log_content(Some(&request.question));
        let completion = self.complete(&body, Some(&request.question)).await?;
        let model = completion.model.clone().or_else(|| resolution.model_slug());

        self.meter(
            request.tenant_id,
            completion.usage.total_tokens,
            &resolution,
            model.as_deref(),
            request.source,
        )
        .await;

        let confidence = if skip_relevance {
            Some(1.0)
        } else {
            completion.confidence.and_then(normalize_confidence)
        };

        let result = AnswerGenerationResult {
            answer: completion.content,
            original_answer: None,
            confidence,
            usage: completion.usage,
            provider: completion.provider.unwrap_or_else(|| resolution.slug.clone()),
            model,
            used_fallback: false,
            citations: completion.citations,
            internal_error: completion.internal_error,
        };

        let gate_context = GateContext {
            tenant_id: request.tenant_id,
            question: request.question,
            knowledge_base_id: request.knowledge_base_id,
            context: context_block,
        };
        Ok(self.gate.evaluate(agent, result, gate_context).await)
    }

    /// Push the tenant's resolved key for a provider to the backend.
    #[instrument(skip(self, provider))]
    pub async fn register_provider(
        &self,
        tenant_id: i64,
        provider: &ProviderRef,
    ) -> Result<Value, GatewayError> {
        let provider = self.resolver.resolve_provider_id(provider).await;
        let credential = self.vault.resolve_default(tenant_id, provider).await?;
        let record = self.db.provider_by_id(provider.get()).await?;
        let slug = match &record {
            Some(record) => record.slug.clone(),
            None => self.resolver.provider_slug(provider).await,
        };

        let registration = ProviderRegistration {
            slug,
            api_key: credential.key,
            base_url: record.and_then(|r| r.base_url),
            is_default: !credential.source.is_environment(),
        };
        Ok(self.backend.register_provider(&registration).await?)
    }

    /// Backend health, passed through as reported.
    pub async fn health(&self) -> Result<Value, GatewayError> {
        Ok(self.backend.health().await?)
    }
}

fn last_user_message(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
}

const EMBEDDING_POINTERS: &[&str] = &["/embedding", "/data/0/embedding", "/embeddings/0", "/vector"];

/// Pull the embedding vector out of a backend response and validate it.
pub fn extract_embedding(raw: &Value, dimensions: usize) -> Result<Vec<f32>, String> {
    let values = EMBEDDING_POINTERS
        .iter()
        .find_map(|p| raw.pointer(p).and_then(Value::as_array))
        .ok_or_else(|| "response contains no embedding vector".to_string())?;

    if values.len() != dimensions {
        return Err(format!(
            "expected {} dimensions, got {}",
            dimensions,
            values.len()
        ));
    }

    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .map(|f| f as f32)
                .filter(|f| f.is_finite())
                .ok_or_else(|| format!("component {} is not a finite number", i))
        })
        .collect()
}
