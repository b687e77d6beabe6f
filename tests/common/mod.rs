//! Shared helpers for Relay integration tests.
//!
//! Every test gets its own in-memory database and a wiremock server standing
//! in for the inference backend.

#![allow(dead_code)]

use relay::agents::AgentProfile;
use relay::config::RelayConfig;
use relay::metering::today;
use relay::store::UsageMetricRow;
use relay::vault::EnvCredentials;
use relay::Gateway;
use serde_json::{json, Value};
use wiremock::MockServer;

pub const SECRET: &str = "integration-test-secret";

/// Agent with a 0.7 threshold and a fallback message.
pub const SUPPORT_AGENT: i64 = 1;
/// Agent with continuous generation enabled.
pub const WRITER_AGENT: i64 = 2;
pub const FALLBACK: &str = "I'm not sure";

pub fn support_agent() -> AgentProfile {
    AgentProfile {
        confidence_threshold: 0.7,
        fallback_message: Some(FALLBACK.to_string()),
        knowledge_base_ids: vec![5],
        ..AgentProfile::new(SUPPORT_AGENT, "support")
    }
}

pub fn writer_agent() -> AgentProfile {
    AgentProfile {
        continuous_generation: true,
        confidence_threshold: 0.0,
        ..AgentProfile::new(WRITER_AGENT, "writer")
    }
}

pub fn test_config(backend_url: &str) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.database.path = ":memory:".to_string();
    config.backend.url = backend_url.to_string();
    config.backend.chat_timeout_ms = 2_000;
    config.backend.embedding_timeout_ms = 2_000;
    config.dispatch.retry_backoff_ms = 10;
    config.agents = vec![support_agent(), writer_agent()];
    config
}

pub async fn gateway_with(config: RelayConfig, env: EnvCredentials) -> Gateway {
    Gateway::builder(config)
        .secret(SECRET)
        .env_credentials(env)
        .build()
        .await
        .expect("gateway should build")
}

/// Gateway against `server` with no environment keys.
pub async fn gateway(server: &MockServer) -> Gateway {
    gateway_with(test_config(&server.uri()), EnvCredentials::default()).await
}

/// Gateway against `server` with an environment key for openai.
pub async fn gateway_with_env_key(server: &MockServer) -> Gateway {
    gateway_with(
        test_config(&server.uri()),
        EnvCredentials::default().with_key("openai", "sk-env-openai-000001"),
    )
    .await
}

pub fn completion(content: &str, total_tokens: i64) -> Value {
    json!({
        "content": content,
        "model": "gpt-4o-mini",
        "provider": "openai",
        "usage": {"total_tokens": total_tokens}
    })
}

pub fn embedding_body(dimensions: usize) -> Value {
    let vector: Vec<f64> = (0..dimensions).map(|i| (i % 7) as f64 * 0.01).collect();
    json!({
        "embedding": vector,
        "model": "text-embedding-3-small",
        "usage": {"total_tokens": 8}
    })
}

/// Today's usage row for a tenant and source.
pub async fn usage_today(gateway: &Gateway, tenant_id: i64, source: &str) -> Option<UsageMetricRow> {
    gateway
        .ledger
        .usage_for(tenant_id, Some(today()))
        .await
        .expect("usage query")
        .into_iter()
        .find(|row| row.source == source)
}
