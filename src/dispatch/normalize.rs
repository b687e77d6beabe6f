//! Normalization of untrusted backend responses.
//!
//! The backend has reported token usage and content under several field
//! layouts over time. Each layout is a named variant here, probed in a fixed
//! order, so the precedence is visible and testable:
//!
//! | Priority | Usage shape |
//! |---|---|
//! | 1 | `usage.total_tokens` |
//! | 2 | `token_usage.total_tokens` |
//! | 3 | `tokenUsage.total_tokens` |
//! | 4 | `total_tokens` |
//! | 5 | `token_count` |
//! | 6 | `prompt_tokens + completion_tokens` (under `usage`, else top level) |

use serde::Serialize;
use serde_json::Value;

/// Marker set on completions synthesized from a backend serialization failure.
pub const SERIALIZATION_ERROR_MARKER: &str = "backend_serialization_error";

/// Where a response's token usage was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageShape {
    Usage(i64),
    TokenUsage(i64),
    TokenUsageCamel(i64),
    TotalTokens(i64),
    TokenCount(i64),
    PromptPlusCompletion { prompt: i64, completion: i64 },
    Absent,
}

impl UsageShape {
    pub fn probe(raw: &Value) -> Self {
        if let Some(n) = count_at(raw, "/usage/total_tokens") {
            return Self::Usage(n);
        }
        if let Some(n) = count_at(raw, "/token_usage/total_tokens") {
            return Self::TokenUsage(n);
        }
        if let Some(n) = count_at(raw, "/tokenUsage/total_tokens") {
            return Self::TokenUsageCamel(n);
        }
        if let Some(n) = count_at(raw, "/total_tokens") {
            return Self::TotalTokens(n);
        }
        if let Some(n) = count_at(raw, "/token_count") {
            return Self::TokenCount(n);
        }
        for prefix in ["/usage", ""] {
            let prompt = count_at(raw, &format!("{}/prompt_tokens", prefix));
            let completion = count_at(raw, &format!("{}/completion_tokens", prefix));
            if prompt.is_some() || completion.is_some() {
                return Self::PromptPlusCompletion {
                    prompt: prompt.unwrap_or(0),
                    completion: completion.unwrap_or(0),
                };
            }
        }
        Self::Absent
    }

    pub fn total_tokens(&self) -> i64 {
        match *self {
            Self::Usage(n)
            | Self::TokenUsage(n)
            | Self::TokenUsageCamel(n)
            | Self::TotalTokens(n)
            | Self::TokenCount(n) => n,
            Self::PromptPlusCompletion { prompt, completion } => prompt.saturating_add(completion),
            Self::Absent => 0,
        }
    }
}

/// Token count of a raw backend response, 0 when none is reported.
pub fn extract_token_count(raw: &Value) -> i64 {
    UsageShape::probe(raw).total_tokens()
}

/// A non-negative integer count, tolerating floats and numeric strings.
fn count_at(raw: &Value, pointer: &str) -> Option<i64> {
    let value = raw.pointer(pointer)?;
    let n = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))?,
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite())?.round() as i64,
        _ => return None,
    };
    Some(n.max(0))
}

const CONTENT_POINTERS: &[&str] = &[
    "/content",
    "/response",
    "/answer",
    "/choices/0/message/content",
    "/message/content",
    "/text",
];

/// First string found along the content probe order.
pub fn extract_content(raw: &Value) -> Option<&str> {
    CONTENT_POINTERS
        .iter()
        .find_map(|p| raw.pointer(p).and_then(Value::as_str))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub total_tokens: i64,
}

/// Canonical completion shape handed to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedCompletion {
    pub content: String,
    pub usage: TokenUsage,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub citations: Vec<Value>,
    /// Raw backend confidence, before scale normalization
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_error: Option<String>,
}

impl NormalizedCompletion {
    pub fn is_synthesized(&self) -> bool {
        self.internal_error.is_some()
    }
}

/// The two things a backend body can be.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    Failure { message: String },
    Completion(NormalizedCompletion),
}

impl ResponseEnvelope {
    pub fn parse(raw: &Value) -> Self {
        let content = extract_content(raw);

        let flagged_failure = raw.get("success").and_then(Value::as_bool) == Some(false);
        let has_error = raw.get("error").is_some_and(|e| !e.is_null());
        if flagged_failure || (has_error && content.is_none()) {
            let message = crate::backend::http::error_message(raw)
                .unwrap_or_else(|| "backend reported an unspecified error".to_string());
            return Self::Failure { message };
        }

        Self::Completion(NormalizedCompletion {
            content: content.unwrap_or_default().to_string(),
            usage: TokenUsage {
                total_tokens: extract_token_count(raw),
            },
            model: string_field(raw, &["/model", "/model_used"]),
            provider: string_field(raw, &["/provider"]),
            citations: citations(raw),
            confidence: confidence(raw),
            internal_error: None,
        })
    }
}

fn string_field(raw: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .find_map(|p| raw.pointer(p).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn citations(raw: &Value) -> Vec<Value> {
    ["/citations", "/sources"]
        .iter()
        .find_map(|p| raw.pointer(p).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

fn confidence(raw: &Value) -> Option<f64> {
    ["/confidence", "/confidence_score"]
        .iter()
        .find_map(|p| raw.pointer(p).and_then(Value::as_f64))
}

/// Whether an error message describes a serialization failure inside the
/// backend rather than a provider or transport problem.
pub fn is_serialization_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("serializ") || message.contains("json encod")
}

/// Conversational stand-in for a completion the backend failed to serialize.
pub fn serialization_apology(last_user_message: Option<&str>) -> NormalizedCompletion {
    let content = match last_user_message.map(str::trim).filter(|m| !m.is_empty()) {
        Some(message) => {
            let quoted: String = message.chars().take(200).collect();
            format!(
                "I'm sorry, something went wrong while I was answering \"{}\". Please try asking again.",
                quoted
            )
        }
        None => "I'm sorry, something went wrong while I was answering. Please try asking again."
            .to_string(),
    };

    NormalizedCompletion {
        content,
        internal_error: Some(SERIALIZATION_ERROR_MARKER.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_probe_order() {
        let all = json!({
            "usage": {"total_tokens": 1},
            "token_usage": {"total_tokens": 2},
            "tokenUsage": {"total_tokens": 3},
            "total_tokens": 4,
            "token_count": 5,
            "prompt_tokens": 6
        });
        assert_eq!(UsageShape::probe(&all), UsageShape::Usage(1));

        let no_usage = json!({"token_usage": {"total_tokens": 2}, "total_tokens": 4});
        assert_eq!(UsageShape::probe(&no_usage), UsageShape::TokenUsage(2));

        let camel = json!({"tokenUsage": {"total_tokens": 3}, "token_count": 5});
        assert_eq!(UsageShape::probe(&camel), UsageShape::TokenUsageCamel(3));

        assert_eq!(UsageShape::probe(&json!({"total_tokens": 4})), UsageShape::TotalTokens(4));
        assert_eq!(UsageShape::probe(&json!({"token_count": 5})), UsageShape::TokenCount(5));
    }

    #[test]
    fn test_prompt_plus_completion() {
        let nested = json!({"usage": {"prompt_tokens": 10, "completion_tokens": 32}});
        assert_eq!(extract_token_count(&nested), 42);

        let flat = json!({"prompt_tokens": 7, "completion_tokens": 3});
        assert_eq!(extract_token_count(&flat), 10);

        let partial = json!({"completion_tokens": 9});
        assert_eq!(extract_token_count(&partial), 9);
    }

    #[test]
    fn test_token_usage_shape_yields_42() {
        let raw = json!({"content": "hi", "token_usage": {"total_tokens": 42}});
        match ResponseEnvelope::parse(&raw) {
            ResponseEnvelope::Completion(c) => assert_eq!(c.usage.total_tokens, 42),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn test_tolerant_counts() {
        assert_eq!(extract_token_count(&json!({"total_tokens": "12"})), 12);
        assert_eq!(extract_token_count(&json!({"total_tokens": 12.6})), 13);
        assert_eq!(extract_token_count(&json!({"total_tokens": -4})), 0);
        // Unusable values fall through to the next shape.
        assert_eq!(
            extract_token_count(&json!({"total_tokens": null, "token_count": 8})),
            8
        );
        assert_eq!(extract_token_count(&json!({})), 0);
        assert_eq!(extract_token_count(&json!("not an object")), 0);
    }

    #[test]
    fn test_content_probe_order() {
        assert_eq!(extract_content(&json!({"content": "a", "response": "b"})), Some("a"));
        assert_eq!(extract_content(&json!({"response": "b", "answer": "c"})), Some("b"));
        assert_eq!(extract_content(&json!({"answer": "c"})), Some("c"));
        assert_eq!(
            extract_content(&json!({"choices": [{"message": {"content": "d"}}], "text": "f"})),
            Some("d")
        );
        assert_eq!(extract_content(&json!({"message": {"content": "e"}})), Some("e"));
        assert_eq!(extract_content(&json!({"text": "f"})), Some("f"));
        assert_eq!(extract_content(&json!({"content": 5})), None);
    }

    #[test]
    fn test_completion_fields() {
        let raw = json!({
            "answer": "Paris",
            "usage": {"total_tokens": 9},
            "model": "gpt-4o-mini",
            "provider": "openai",
            "sources": [{"title": "doc"}],
            "confidence": 87
        });
        let ResponseEnvelope::Completion(c) = ResponseEnvelope::parse(&raw) else {
            panic!("expected completion");
        };
        assert_eq!(c.content, "Paris");
        assert_eq!(c.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(c.provider.as_deref(), Some("openai"));
        assert_eq!(c.citations.len(), 1);
        assert_eq!(c.confidence, Some(87.0));
        assert!(!c.is_synthesized());
    }

    #[test]
    fn test_failure_envelopes() {
        let flagged = json!({"success": false, "message": "quota exceeded"});
        assert_eq!(
            ResponseEnvelope::parse(&flagged),
            ResponseEnvelope::Failure {
                message: "quota exceeded".to_string()
            }
        );

        let nested = json!({"error": {"message": "bad key"}});
        assert!(matches!(
            ResponseEnvelope::parse(&nested),
            ResponseEnvelope::Failure { ref message } if message == "bad key"
        ));

        // An error field next to real content is not a failure.
        let with_content = json!({"content": "ok", "error": null});
        assert!(matches!(
            ResponseEnvelope::parse(&with_content),
            ResponseEnvelope::Completion(_)
        ));
    }

    #[test]
    fn test_serialization_failure_detection() {
        assert!(is_serialization_failure("Object of type datetime is not JSON serializable"));
        assert!(is_serialization_failure("Serialization error in response"));
        assert!(!is_serialization_failure("Invalid API key"));
    }

    #[test]
    fn test_apology_quotes_last_message() {
        let apology = serialization_apology(Some("What is our refund policy?"));
        assert!(apology.content.contains("What is our refund policy?"));
        assert_eq!(apology.internal_error.as_deref(), Some(SERIALIZATION_ERROR_MARKER));
        assert_eq!(apology.usage.total_tokens, 0);

        let bare = serialization_apology(None);
        assert!(bare.content.starts_with("I'm sorry"));
    }
}
