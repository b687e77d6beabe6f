//! Request bodies sent to the inference backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// `POST /chat/completions` body.
///
/// Answer-generation calls additionally set the prompt, continuation and
/// relevance fields; plain chat leaves them empty and they are omitted.
#[derive(Clone, Default, Serialize)]
pub struct BackendChatRequest {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub auto_select_model: bool,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_text: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_continuation: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_threshold: Option<f64>,
}

impl fmt::Debug for BackendChatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendChatRequest")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("auto_select_model", &self.auto_select_model)
            .field("messages", &self.messages.len())
            .field("has_api_key", &self.api_key.is_some())
            .field("is_continuation", &self.is_continuation)
            .finish_non_exhaustive()
    }
}

/// `POST /embeddings` body.
#[derive(Clone, Serialize)]
pub struct BackendEmbeddingRequest {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl fmt::Debug for BackendEmbeddingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendEmbeddingRequest")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("text_len", &self.text.len())
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

/// `POST /providers/register` body.
#[derive(Clone, Serialize)]
pub struct ProviderRegistration {
    pub slug: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub is_default: bool,
}

impl fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("slug", &self.slug)
            .field("base_url", &self.base_url)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}
