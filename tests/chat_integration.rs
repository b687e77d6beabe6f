//! Chat completion dispatch against a mock inference backend.

mod common;

use chrono::{Duration, Utc};
use common::*;
use relay::backend::ChatMessage;
use relay::dispatch::{ChatRequest, GatewayError, SERIALIZATION_ERROR_MARKER};
use relay::resolver::{ModelRef, ProviderId, ProviderRef};
use relay::vault::{NewCredential, VaultError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat(tenant_id: i64, message: &str) -> ChatRequest {
    ChatRequest {
        tenant_id,
        messages: vec![ChatMessage::user(message)],
        ..Default::default()
    }
}

fn tenant_key(tenant_id: i64, key: &str, is_default: bool) -> NewCredential {
    NewCredential {
        tenant_id,
        provider: ProviderId::PRIMARY,
        label: "prod".to_string(),
        key: key.to_string(),
        is_default,
        expires_at: None,
    }
}

#[tokio::test]
async fn chat_with_environment_key_is_metered_as_environment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "provider": "openai",
            "api_key": "sk-env-openai-000001"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hello!", 17)))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_env_key(&server).await;
    let result = gateway.dispatcher.chat_completion(chat(4, "hi")).await.unwrap();

    assert_eq!(result.content, "Hello!");
    assert_eq!(result.usage.total_tokens, 17);

    let row = usage_today(&gateway, 4, "chat").await.unwrap();
    assert_eq!(row.value, 17);
    assert_eq!(row.metric_type, "llm_tokens_used");
    assert_eq!(row.metadata["credential_type"], "environment");
    assert_eq!(row.metadata["provider"], "openai");
}

#[tokio::test]
async fn tenant_default_key_wins_over_environment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"api_key": "sk-tenant-key-000042"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("From tenant", 3)))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_env_key(&server).await;
    gateway
        .vault
        .store(tenant_key(9, "sk-tenant-key-000042", true))
        .await
        .unwrap();

    let result = gateway.dispatcher.chat_completion(chat(9, "hi")).await.unwrap();
    assert_eq!(result.content, "From tenant");

    let row = usage_today(&gateway, 9, "chat").await.unwrap();
    assert_eq!(row.metadata["credential_type"], "tenant");
}

#[tokio::test]
async fn expired_default_falls_back_to_environment_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"api_key": "sk-env-openai-000001"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok", 1)))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_env_key(&server).await;
    let mut expired = tenant_key(9, "sk-tenant-expired-0001", true);
    expired.expires_at = Some(Utc::now() - Duration::days(1));
    gateway.vault.store(expired).await.unwrap();

    gateway.dispatcher.chat_completion(chat(9, "hi")).await.unwrap();
}

#[tokio::test]
async fn token_usage_shape_is_metered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Sure.",
            "token_usage": {"total_tokens": 42}
        })))
        .mount(&server)
        .await;

    let gateway = gateway_with_env_key(&server).await;
    let result = gateway.dispatcher.chat_completion(chat(3, "hi")).await.unwrap();

    assert_eq!(result.content, "Sure.");
    assert_eq!(result.usage.total_tokens, 42);
    assert_eq!(usage_today(&gateway, 3, "chat").await.unwrap().value, 42);
}

#[tokio::test]
async fn missing_credential_fails_before_calling_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("never", 1)))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = gateway(&server).await;
    let err = gateway.dispatcher.chat_completion(chat(3, "hi")).await.unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Vault(VaultError::NoCredentialAvailable { ref provider }) if provider == "openai"
    ));
    assert!(err.user_message().contains("openai"));
}

#[tokio::test]
async fn serialization_failure_becomes_apology() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "Object of type Decimal is not JSON serializable"
        })))
        .mount(&server)
        .await;

    let gateway = gateway_with_env_key(&server).await;
    let result = gateway
        .dispatcher
        .chat_completion(chat(3, "What are your opening hours?"))
        .await
        .unwrap();

    assert_eq!(result.internal_error.as_deref(), Some(SERIALIZATION_ERROR_MARKER));
    assert!(result.content.contains("What are your opening hours?"));
    assert_eq!(result.usage.total_tokens, 0);
    assert!(usage_today(&gateway, 3, "chat").await.is_none());
}

#[tokio::test]
async fn chat_is_not_retried_on_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"message": "provider overloaded"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_env_key(&server).await;
    let err = gateway.dispatcher.chat_completion(chat(3, "hi")).await.unwrap_err();

    match err {
        GatewayError::Upstream { status, message } => {
            assert_eq!(status, Some(503));
            assert!(message.contains("overloaded"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("late", 1))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.backend.chat_timeout_ms = 50;
    let gateway = gateway_with(
        config,
        relay::vault::EnvCredentials::default().with_key("openai", "sk-env-openai-000001"),
    )
    .await;

    let err = gateway.dispatcher.chat_completion(chat(3, "hi")).await.unwrap_err();
    assert!(matches!(err, GatewayError::BackendTimeout(50)));
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn provider_and_model_are_resolved_from_slugs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "provider": "anthropic",
            "model": "claude-3-5-haiku-latest",
            "auto_select_model": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "Bonjour",
            "usage": {"prompt_tokens": 4, "completion_tokens": 6}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with(
        test_config(&server.uri()),
        relay::vault::EnvCredentials::default().with_key("anthropic", "sk-ant-env-0000001"),
    )
    .await;

    let mut request = chat(3, "hi");
    request.provider = ProviderRef::from("anthropic");
    request.model = ModelRef::parse(ProviderRef::from(10_i64), "auto");
    let result = gateway.dispatcher.chat_completion(request).await.unwrap();

    assert_eq!(result.usage.total_tokens, 10);
    assert_eq!(result.model.as_deref(), Some("claude-3-5-haiku-latest"));
    assert_eq!(result.provider.as_deref(), Some("anthropic"));
}

#[tokio::test]
async fn auto_model_lets_backend_choose() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"auto_select_model": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("picked", 2)))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_env_key(&server).await;
    let mut request = chat(3, "hi");
    request.model = ModelRef::Auto;
    gateway.dispatcher.chat_completion(request).await.unwrap();
}
