//! Answer quality gate.
//!
//! Confidence arrives on either a 0-1 or 0-100 scale. The gate normalizes
//! it, swaps in the agent's fallback message when it falls below the agent's
//! threshold, and reports every answer to an [`UnansweredDetector`].

pub mod unanswered;

pub use unanswered::{
    AnswerObservation, DetectionOutcome, DetectorError, HeuristicDetector, UnansweredDetector,
};

use crate::agents::AgentProfile;
use crate::dispatch::normalize::TokenUsage;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Map a raw confidence to `[0, 1]`.
///
/// Values above 1 are read as percentages. Negatives clamp to 0; NaN and
/// infinities carry no information and yield `None`.
pub fn normalize_confidence(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    if raw > 1.0 {
        return Some((raw / 100.0).min(1.0));
    }
    Some(raw.max(0.0))
}

/// Result of one answer-generation call after gating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerGenerationResult {
    pub answer: String,
    /// Backend answer when the fallback message replaced it
    pub original_answer: Option<String>,
    /// Normalized to `[0, 1]`
    pub confidence: Option<f64>,
    pub usage: TokenUsage,
    pub provider: String,
    pub model: Option<String>,
    pub used_fallback: bool,
    pub citations: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_error: Option<String>,
}

/// Question-side details the detector needs alongside the result.
#[derive(Debug, Clone, Default)]
pub struct GateContext {
    pub tenant_id: i64,
    pub question: String,
    pub knowledge_base_id: Option<i64>,
    pub context: Option<String>,
}

#[derive(Clone)]
pub struct AnswerQualityGate {
    detector: Arc<dyn UnansweredDetector>,
}

impl AnswerQualityGate {
    pub fn new(detector: Arc<dyn UnansweredDetector>) -> Self {
        Self { detector }
    }

    /// Apply the agent's threshold and notify the detector.
    ///
    /// An answer without a confidence score is never replaced, and neither
    /// is a synthesized apology. The detector sees every answer, apologies
    /// included. Detector failures are logged and do not affect the result.
    pub async fn evaluate(
        &self,
        agent: &AgentProfile,
        mut result: AnswerGenerationResult,
        context: GateContext,
    ) -> AnswerGenerationResult {
        let below_threshold = result.internal_error.is_none()
            && result
                .confidence
                .is_some_and(|c| c < agent.confidence_threshold);

        if below_threshold {
            if let Some(fallback) = agent.fallback() {
                tracing::info!(
                    agent_id = agent.id,
                    confidence = ?result.confidence,
                    threshold = agent.confidence_threshold,
                    "Confidence below threshold, using fallback message"
                );
                metrics::counter!("relay_answer_fallbacks_total").increment(1);
                let original = std::mem::replace(&mut result.answer, fallback.to_string());
                result.original_answer = Some(original);
                result.used_fallback = true;
            }
        }

        let observation = AnswerObservation {
            tenant_id: context.tenant_id,
            agent_id: agent.id,
            knowledge_base_id: context.knowledge_base_id,
            question: context.question,
            shown_answer: result.answer.clone(),
            original_answer: result.original_answer.clone(),
            confidence: result.confidence,
            context: context.context,
            used_fallback: result.used_fallback,
            internal_error: result.internal_error.clone(),
        };
        if let Err(e) = self.detector.observe(&observation).await {
            tracing::warn!(agent_id = agent.id, error = %e, "Unanswered-question detector failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDetector {
        seen: Mutex<Vec<AnswerObservation>>,
        fail: bool,
    }

    #[async_trait]
    impl UnansweredDetector for RecordingDetector {
        async fn observe(
            &self,
            observation: &AnswerObservation,
        ) -> Result<DetectionOutcome, DetectorError> {
            self.seen.lock().unwrap().push(observation.clone());
            if self.fail {
                return Err(DetectorError::Store(crate::store::StoreError::Task(
                    "boom".to_string(),
                )));
            }
            Ok(DetectionOutcome::Answered)
        }
    }

    fn result(answer: &str, confidence: Option<f64>) -> AnswerGenerationResult {
        AnswerGenerationResult {
            answer: answer.to_string(),
            original_answer: None,
            confidence,
            usage: TokenUsage { total_tokens: 12 },
            provider: "openai".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            used_fallback: false,
            citations: Vec::new(),
            internal_error: None,
        }
    }

    fn agent(threshold: f64, fallback: Option<&str>) -> AgentProfile {
        AgentProfile {
            confidence_threshold: threshold,
            fallback_message: fallback.map(str::to_string),
            ..AgentProfile::new(3, "support")
        }
    }

    fn question(text: &str) -> GateContext {
        GateContext {
            tenant_id: 1,
            question: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_confidence() {
        assert_eq!(normalize_confidence(87.0), Some(0.87));
        assert_eq!(normalize_confidence(100.0), Some(1.0));
        assert_eq!(normalize_confidence(250.0), Some(1.0));
        assert_eq!(normalize_confidence(0.42), Some(0.42));
        assert_eq!(normalize_confidence(1.0), Some(1.0));
        assert_eq!(normalize_confidence(0.0), Some(0.0));
        assert_eq!(normalize_confidence(-3.0), Some(0.0));
        assert_eq!(normalize_confidence(f64::NAN), None);
        assert_eq!(normalize_confidence(f64::INFINITY), None);
    }

    #[tokio::test]
    async fn test_below_threshold_uses_fallback() {
        let detector = Arc::new(RecordingDetector::default());
        let gate = AnswerQualityGate::new(detector.clone());

        let gated = gate
            .evaluate(
                &agent(0.7, Some("I'm not sure")),
                result("Maybe 42?", Some(0.5)),
                question("What is the answer?"),
            )
            .await;

        assert_eq!(gated.answer, "I'm not sure");
        assert_eq!(gated.original_answer.as_deref(), Some("Maybe 42?"));
        assert!(gated.used_fallback);

        let seen = detector.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].shown_answer, "I'm not sure");
        assert_eq!(seen[0].original_answer.as_deref(), Some("Maybe 42?"));
        assert_eq!(seen[0].question, "What is the answer?");
    }

    #[tokio::test]
    async fn test_above_threshold_keeps_answer() {
        let detector = Arc::new(RecordingDetector::default());
        let gate = AnswerQualityGate::new(detector.clone());

        let gated = gate
            .evaluate(
                &agent(0.7, Some("I'm not sure")),
                result("42", Some(0.9)),
                question("q"),
            )
            .await;

        assert_eq!(gated.answer, "42");
        assert!(!gated.used_fallback);
        assert!(gated.original_answer.is_none());
        assert_eq!(detector.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_fallback_configured_keeps_answer() {
        let gate = AnswerQualityGate::new(Arc::new(RecordingDetector::default()));
        let gated = gate
            .evaluate(&agent(0.7, None), result("42", Some(0.1)), question("q"))
            .await;
        assert_eq!(gated.answer, "42");
        assert!(!gated.used_fallback);
    }

    #[tokio::test]
    async fn test_missing_confidence_is_not_gated() {
        let gate = AnswerQualityGate::new(Arc::new(RecordingDetector::default()));
        let gated = gate
            .evaluate(&agent(0.7, Some("fallback")), result("42", None), question("q"))
            .await;
        assert_eq!(gated.answer, "42");
    }

    #[tokio::test]
    async fn test_apology_is_forwarded_but_not_replaced() {
        let detector = Arc::new(RecordingDetector::default());
        let gate = AnswerQualityGate::new(detector.clone());

        let mut apology = result("Sorry, something went wrong.", Some(0.1));
        apology.internal_error = Some("backend_serialization_error".to_string());
        let gated = gate
            .evaluate(&agent(0.7, Some("fallback")), apology, question("Where is my order?"))
            .await;

        assert_eq!(gated.answer, "Sorry, something went wrong.");
        assert!(!gated.used_fallback);

        let seen = detector.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].question, "Where is my order?");
        assert_eq!(seen[0].internal_error.as_deref(), Some("backend_serialization_error"));
    }

    #[tokio::test]
    async fn test_detector_failure_is_swallowed() {
        let detector = Arc::new(RecordingDetector {
            fail: true,
            ..Default::default()
        });
        let gate = AnswerQualityGate::new(detector.clone());
        let gated = gate
            .evaluate(&agent(0.7, Some("fallback")), result("42", Some(0.2)), question("q"))
            .await;
        assert!(gated.used_fallback);
        assert_eq!(detector.seen.lock().unwrap().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_percent_scale(c in 1.0001f64..=100.0) {
            let normalized = normalize_confidence(c).unwrap();
            prop_assert!((normalized - c / 100.0).abs() < 1e-12);
        }

        #[test]
        fn prop_unit_scale_unchanged(c in 0.0f64..=1.0) {
            prop_assert_eq!(normalize_confidence(c), Some(c));
        }
    }
}
