//! Detection of questions the agent did not really answer.

use crate::config::QualityConfig;
use crate::store::{Database, NewUnansweredQuestion, StoreError, UnansweredWrite};
use async_trait::async_trait;
use thiserror::Error;

/// Everything the detector sees about one answered question.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerObservation {
    pub tenant_id: i64,
    pub agent_id: i64,
    pub knowledge_base_id: Option<i64>,
    pub question: String,
    /// Answer actually shown to the user
    pub shown_answer: String,
    /// Backend answer when a fallback replaced it
    pub original_answer: Option<String>,
    pub confidence: Option<f64>,
    pub context: Option<String>,
    pub used_fallback: bool,
    /// Set when the shown answer is a synthesized apology
    pub internal_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// The answer looked fine.
    Answered,
    /// A new pending question was stored.
    Recorded { id: i64 },
    /// An existing pending question absorbed this one.
    Duplicate { id: i64, occurrences: i64 },
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Detector store error: {0}")]
    Store(#[from] StoreError),
}

/// Receives every gated answer and decides whether to queue the question.
#[async_trait]
pub trait UnansweredDetector: Send + Sync + 'static {
    async fn observe(&self, observation: &AnswerObservation) -> Result<DetectionOutcome, DetectorError>;
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_question(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Phrase, length and confidence heuristics with duplicate suppression
/// against pending questions of the same agent and knowledge base.
pub struct HeuristicDetector {
    db: Database,
    config: QualityConfig,
}

impl HeuristicDetector {
    pub fn new(db: Database, config: QualityConfig) -> Self {
        Self { db, config }
    }

    /// Why the answer counts as unanswered, if it does.
    pub fn reason(&self, observation: &AnswerObservation) -> Option<&'static str> {
        if observation.internal_error.is_some() {
            return Some("internal_error");
        }
        if observation.used_fallback {
            return Some("fallback");
        }
        let answer = observation.shown_answer.trim().to_lowercase();
        if self
            .config
            .uncertainty_phrases
            .iter()
            .any(|phrase| !phrase.is_empty() && answer.contains(&phrase.to_lowercase()))
        {
            return Some("uncertainty_phrase");
        }
        if answer.chars().count() < self.config.min_answer_chars {
            return Some("too_short");
        }
        if observation
            .confidence
            .is_some_and(|c| c < self.config.confidence_floor)
        {
            return Some("low_confidence");
        }
        None
    }
}

#[async_trait]
impl UnansweredDetector for HeuristicDetector {
    async fn observe(&self, observation: &AnswerObservation) -> Result<DetectionOutcome, DetectorError> {
        let Some(reason) = self.reason(observation) else {
            return Ok(DetectionOutcome::Answered);
        };

        let normalized = normalize_question(&observation.question);
        if normalized.is_empty() {
            return Ok(DetectionOutcome::Answered);
        }

        let question = NewUnansweredQuestion {
            tenant_id: observation.tenant_id,
            agent_id: observation.agent_id,
            knowledge_base_id: observation.knowledge_base_id,
            question: observation.question.trim().to_string(),
            answer: observation.shown_answer.clone(),
            confidence: observation.confidence,
        };
        let write = self
            .db
            .record_unanswered(question, move |existing| {
                let other = normalize_question(existing);
                !other.is_empty() && (other.contains(&normalized) || normalized.contains(&other))
            })
            .await?;

        let id = match write {
            UnansweredWrite::Bumped { id, occurrences } => {
                tracing::debug!(question_id = id, occurrences, "Duplicate unanswered question");
                return Ok(DetectionOutcome::Duplicate { id, occurrences });
            }
            UnansweredWrite::Inserted { id } => id,
        };
        tracing::info!(question_id = id, agent_id = observation.agent_id, reason, "Recorded unanswered question");
        Ok(DetectionOutcome::Recorded { id })
    }
}
