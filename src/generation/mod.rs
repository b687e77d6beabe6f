//! Continuous (multi-section) content generation.
//!
//! Long-form output is produced by a bounded series of dependent answer
//! calls. Each call sees the text accumulated so far, and the result is only
//! returned when every section succeeded.

use crate::agents::{AgentDirectory, ContextChunk, ContextRetriever};
use crate::dispatch::{AnswerRequest, Dispatcher, GatewayError};
use crate::metering::UsageSource;
use crate::resolver::{ModelRef, ProviderRef};
use std::sync::Arc;
use tracing::instrument;

/// Chunks retrieved for the whole generation.
pub const DEFAULT_CONTEXT_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub tenant_id: i64,
    pub provider: ProviderRef,
    pub model: ModelRef,
    pub query: String,
    pub agent_id: i64,
    pub knowledge_base_id: Option<i64>,
    pub total_sections: u32,
    pub max_tokens_per_section: Option<u32>,
    pub temperature: Option<f32>,
}

/// State of one generation run. Lives only for the duration of the call.
#[derive(Debug, Clone, Default)]
pub struct GenerationSession {
    pub accumulated: String,
    pub section_index: u32,
    pub total_sections: u32,
    pub query: String,
    pub context: Vec<ContextChunk>,
}

impl GenerationSession {
    pub fn new(query: impl Into<String>, total_sections: u32, context: Vec<ContextChunk>) -> Self {
        Self {
            query: query.into(),
            total_sections,
            context,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.section_index >= self.total_sections
    }

    /// Query annotated with the current section counter.
    pub fn section_prompt(&self) -> String {
        format!(
            "{}\n\n[Section {} of {}]",
            self.query,
            self.section_index + 1,
            self.total_sections
        )
    }

    pub fn append(&mut self, section: &str) {
        self.accumulated.push_str(section);
        self.section_index += 1;
    }
}

#[derive(Clone)]
pub struct ContinuousGenerator {
    dispatcher: Dispatcher,
    agents: Arc<dyn AgentDirectory>,
    retriever: Arc<dyn ContextRetriever>,
    context_limit: usize,
}

impl ContinuousGenerator {
    pub fn new(
        dispatcher: Dispatcher,
        agents: Arc<dyn AgentDirectory>,
        retriever: Arc<dyn ContextRetriever>,
    ) -> Self {
        Self {
            dispatcher,
            agents,
            retriever,
            context_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }

    pub fn with_context_limit(mut self, limit: usize) -> Self {
        self.context_limit = limit;
        self
    }

    /// Generate `total_sections` sections and return their concatenation.
    ///
    /// # Errors
    ///
    /// `AgentNotFound`, `GenerationDisabled`, or the first section failure;
    /// nothing partial is returned.
    #[instrument(skip(self, request), fields(
        tenant_id = request.tenant_id,
        agent_id = request.agent_id,
        sections = request.total_sections
    ))]
    pub async fn generate(&self, request: GenerationRequest) -> Result<String, GatewayError> {
        let agent = self
            .agents
            .agent(request.agent_id)
            .await
            .ok_or(GatewayError::AgentNotFound(request.agent_id))?;
        if !agent.continuous_generation {
            return Err(GatewayError::GenerationDisabled(agent.id));
        }

        let context = match request.knowledge_base_id {
            Some(kb_id) => match self
                .retriever
                .retrieve(kb_id, &request.query, self.context_limit)
                .await
            {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!(knowledge_base_id = kb_id, error = %e, "Context retrieval failed, generating without context");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut session = GenerationSession::new(&request.query, request.total_sections, context);

        while !session.is_complete() {
            let answer = AnswerRequest {
                tenant_id: request.tenant_id,
                provider: request.provider.clone(),
                model: request.model.clone(),
                agent: agent.clone(),
                question: session.section_prompt(),
                knowledge_base_id: request.knowledge_base_id,
                context: session.context.clone(),
                continuation_text: Some(session.accumulated.clone()),
                is_continuation: session.section_index > 0,
                temperature: request.temperature,
                max_tokens: request.max_tokens_per_section,
                source: UsageSource::Generation,
            };

            let result = self.dispatcher.generate_answer(answer).await?;
            if let Some(marker) = result.internal_error {
                return Err(GatewayError::Upstream {
                    status: None,
                    message: format!(
                        "section {} of {} failed: {}",
                        session.section_index + 1,
                        session.total_sections,
                        marker
                    ),
                });
            }

            tracing::debug!(
                section = session.section_index + 1,
                chars = result.answer.len(),
                "Generated section"
            );
            session.append(&result.answer);
        }

        Ok(session.accumulated)
    }
}
