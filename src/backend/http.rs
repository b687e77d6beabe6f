//! reqwest implementation of [`InferenceBackend`].

use super::{
    BackendChatRequest, BackendEmbeddingRequest, BackendError, InferenceBackend,
    ProviderRegistration,
};
use crate::config::BackendConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// HTTP client for the inference backend.
///
/// Each endpoint gets its own timeout from [`BackendConfig`].
pub struct HttpBackend {
    base_url: String,
    config: BackendConfig,
    /// Shared HTTP client for connection pooling
    client: Arc<Client>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self::with_client(config, Arc::new(Client::new()))
    }

    pub fn with_client(config: BackendConfig, client: Arc<Client>) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            config,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Value, BackendError> {
        let request = self.client.post(self.url(path)).json(body);
        self.send(path, request, timeout).await
    }

    async fn send(
        &self,
        path: &str,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Value, BackendError> {
        let timeout_ms = timeout.as_millis() as u64;
        let response = request.timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(timeout_ms)
            } else {
                BackendError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        metrics::counter!(
            "relay_backend_requests_total",
            "endpoint" => path.to_string(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(timeout_ms)
            } else {
                BackendError::InvalidResponse(format!("Failed to read response body: {}", e))
            }
        })?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<Value>(&body).ok();
            let message = parsed
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        status.to_string()
                    } else {
                        body.trim().to_string()
                    }
                });
            return Err(BackendError::Upstream {
                status: status.as_u16(),
                message,
                body: parsed,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            BackendError::InvalidResponse(format!("Failed to parse backend response: {}", e))
        })
    }
}

/// Pull a human-readable message out of an error body.
pub(crate) fn error_message(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/message"),
        body.get("error"),
        body.get("detail"),
        body.get("message"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    async fn health(&self) -> Result<Value, BackendError> {
        let request = self.client.get(self.url("/health"));
        self.send("/health", request, self.config.health_timeout())
            .await
    }

    async fn register_provider(
        &self,
        registration: &ProviderRegistration,
    ) -> Result<Value, BackendError> {
        self.post(
            "/providers/register",
            registration,
            self.config.registration_timeout(),
        )
        .await
    }

    async fn chat_completion(&self, request: &BackendChatRequest) -> Result<Value, BackendError> {
        self.post("/chat/completions", request, self.config.chat_timeout())
            .await
    }

    async fn embedding(&self, request: &BackendEmbeddingRequest) -> Result<Value, BackendError> {
        self.post("/embeddings", request, self.config.embedding_timeout())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatMessage;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn backend(url: String) -> HttpBackend {
        HttpBackend::new(BackendConfig {
            url,
            chat_timeout_ms: 2_000,
            embedding_timeout_ms: 2_000,
            registration_timeout_ms: 2_000,
            health_timeout_ms: 2_000,
        })
    }

    fn chat_request() -> BackendChatRequest {
        BackendChatRequest {
            provider: "openai".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            messages: vec![ChatMessage::user("hello")],
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let health = backend(server.url()).health().await.unwrap();

        mock.assert_async().await;
        assert_eq!(health["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_completion_posts_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "provider": "openai",
                "model": "gpt-4o-mini",
                "api_key": "sk-test"
            })))
            .with_status(200)
            .with_body(r#"{"content":"Hi!","usage":{"total_tokens":5}}"#)
            .create_async()
            .await;

        let response = backend(format!("{}/", server.url()))
            .chat_completion(&chat_request())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response["content"], "Hi!");
    }

    #[tokio::test]
    async fn test_upstream_error_extracts_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body(r#"{"error":{"message":"Object of type datetime is not JSON serializable"}}"#)
            .create_async()
            .await;

        let err = backend(server.url())
            .chat_completion(&chat_request())
            .await
            .unwrap_err();

        mock.assert_async().await;
        match err {
            BackendError::Upstream { status, message, body } => {
                assert_eq!(status, 500);
                assert!(message.contains("not JSON serializable"));
                assert!(body.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upstream_plain_text_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(503)
            .with_body("Service unavailable")
            .create_async()
            .await;

        let request = BackendEmbeddingRequest {
            provider: "openai".to_string(),
            model: None,
            text: "hello".to_string(),
            api_key: None,
        };
        let err = backend(server.url()).embedding(&request).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::Upstream { status: 503, ref message, body: None } if message == "Service unavailable"
        ));
    }

    #[tokio::test]
    async fn test_non_json_success_is_invalid_response() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = backend(server.url()).health().await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 9 (discard) is closed on test hosts.
        let err = backend("http://127.0.0.1:9".to_string())
            .health()
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_error_message_candidates() {
        assert_eq!(
            error_message(&json!({"error": {"message": "a"}})),
            Some("a".to_string())
        );
        assert_eq!(error_message(&json!({"error": "b"})), Some("b".to_string()));
        assert_eq!(error_message(&json!({"detail": "c"})), Some("c".to_string()));
        assert_eq!(error_message(&json!({"other": 1})), None);
    }
}
