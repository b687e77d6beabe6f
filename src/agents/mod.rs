//! Agent configuration and knowledge-base context collaborators.
//!
//! The gateway only reads agent settings and consumes retrieved context; it
//! never owns either. Both are reached through traits so callers can plug in
//! their own storage and vector index.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-agent settings that shape prompts and answer gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: i64,
    pub name: String,
    /// System prompt template; `{context}` is replaced by the context block
    #[serde(default)]
    pub prompt_template: Option<String>,
    /// Custom rules appended to the system prompt
    #[serde(default)]
    pub rules: Vec<String>,
    /// Minimum normalized confidence (0-1) before the fallback message is used
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub fallback_message: Option<String>,
    #[serde(default)]
    pub continuous_generation: bool,
    #[serde(default)]
    pub knowledge_base_ids: Vec<i64>,
    /// Treat context-grounded answers as always relevant instead of applying
    /// the backend's relevance filter
    #[serde(default)]
    pub skip_relevance_filtering: bool,
}

fn default_confidence_threshold() -> f64 {
    0.5
}

impl AgentProfile {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            prompt_template: None,
            rules: Vec::new(),
            confidence_threshold: default_confidence_threshold(),
            fallback_message: None,
            continuous_generation: false,
            knowledge_base_ids: Vec::new(),
            skip_relevance_filtering: false,
        }
    }

    /// The fallback message, if one is configured and non-blank.
    pub fn fallback(&self) -> Option<&str> {
        self.fallback_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Render the system prompt for an answer call.
    pub fn system_prompt(&self, context_block: Option<&str>) -> String {
        let context = context_block.unwrap_or("");
        let mut prompt = match &self.prompt_template {
            Some(template) if template.contains("{context}") => {
                template.replace("{context}", context)
            }
            Some(template) if context.is_empty() => template.clone(),
            Some(template) => format!("{}\n\n{}", template, context),
            None if context.is_empty() => {
                "You are a helpful assistant. Answer the user's question accurately.".to_string()
            }
            None => format!(
                "You are a helpful assistant. Answer using the context below.\n\n{}",
                context
            ),
        };

        if !self.rules.is_empty() {
            prompt.push_str("\n\nRules:");
            for rule in &self.rules {
                prompt.push_str("\n- ");
                prompt.push_str(rule);
            }
        }

        prompt
    }
}

/// Read-only source of agent settings.
#[async_trait]
pub trait AgentDirectory: Send + Sync + 'static {
    async fn agent(&self, agent_id: i64) -> Option<AgentProfile>;
}

/// In-process agent directory, seeded from configuration.
#[derive(Debug, Default)]
pub struct StaticAgentDirectory {
    agents: DashMap<i64, AgentProfile>,
}

impl StaticAgentDirectory {
    pub fn new(agents: impl IntoIterator<Item = AgentProfile>) -> Self {
        let directory = Self::default();
        for agent in agents {
            directory.upsert(agent);
        }
        directory
    }

    /// Insert or replace an agent profile.
    pub fn upsert(&self, agent: AgentProfile) {
        self.agents.insert(agent.id, agent);
    }

    pub fn get(&self, agent_id: i64) -> Option<AgentProfile> {
        self.agents.get(&agent_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn agent(&self, agent_id: i64) -> Option<AgentProfile> {
        self.get(agent_id)
    }
}

/// One retrieved knowledge-base chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub content: String,
}

#[derive(Debug, Error)]
#[error("Context retrieval failed: {0}")]
pub struct RetrievalError(pub String);

/// Ranked nearest-neighbor lookup over a knowledge base.
#[async_trait]
pub trait ContextRetriever: Send + Sync + 'static {
    async fn retrieve(
        &self,
        knowledge_base_id: i64,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ContextChunk>, RetrievalError>;
}

/// Retriever for deployments without a vector index.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContext;

#[async_trait]
impl ContextRetriever for NoContext {
    async fn retrieve(
        &self,
        _knowledge_base_id: i64,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<ContextChunk>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// Format retrieved chunks into a numbered context block.
///
/// Blank chunks are skipped; returns `None` when nothing usable remains.
pub fn format_context_block(chunks: &[ContextChunk]) -> Option<String> {
    let parts: Vec<String> = chunks
        .iter()
        .map(|c| c.content.trim())
        .filter(|c| !c.is_empty())
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(format!("Context:\n{}", parts.join("\n\n")))
    }
}
