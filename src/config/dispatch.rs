//! Dispatch and answer-quality configuration

use serde::{Deserialize, Serialize};

/// Fixed dimensionality of the downstream vector index.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Inference dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Required length of every embedding vector
    pub embedding_dimensions: usize,
    /// Extra attempts for embedding calls after a transport failure.
    /// Chat completions are never retried (duplicate token billing).
    pub embedding_retries: u32,
    /// Delay before the first embedding retry, doubled per attempt
    pub retry_backoff_ms: u64,
    /// Model reference that asks the backend to choose the model itself
    pub auto_model_sentinel: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            embedding_retries: 1,
            retry_backoff_ms: 250,
            auto_model_sentinel: "auto".to_string(),
        }
    }
}

/// Unanswered-question detector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Phrases that mark an answer as uncertain (matched case-insensitively)
    pub uncertainty_phrases: Vec<String>,
    /// Answers shorter than this are treated as non-answers
    pub min_answer_chars: usize,
    /// Confidence below this marks the question as unanswered
    pub confidence_floor: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            uncertainty_phrases: [
                "i don't know",
                "i do not know",
                "i'm not sure",
                "i am not sure",
                "i don't have information",
                "i do not have information",
                "i couldn't find",
                "i could not find",
                "no information",
                "not mentioned in",
                "unable to answer",
                "cannot answer",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_answer_chars: 20,
            confidence_floor: 0.5,
        }
    }
}
