//! External inference backend.
//!
//! The backend is an opaque HTTP service that owns the actual provider SDKs.
//! The gateway only talks to it through [`InferenceBackend`], and every
//! response comes back as raw JSON because its shape is not trusted; see
//! [`crate::dispatch::normalize`].

mod error;
pub mod http;
pub mod types;

pub use error::BackendError;
pub use http::HttpBackend;
pub use types::{BackendChatRequest, BackendEmbeddingRequest, ChatMessage, ProviderRegistration};

use async_trait::async_trait;
use serde_json::Value;

/// Calls the gateway makes to the inference backend.
///
/// Object-safe; used as `Arc<dyn InferenceBackend>`. Implementations must
/// bound every call with a timeout and report it as
/// [`BackendError::Timeout`].
#[async_trait]
pub trait InferenceBackend: Send + Sync + 'static {
    /// `GET /health`
    async fn health(&self) -> Result<Value, BackendError>;

    /// `POST /providers/register`
    async fn register_provider(&self, registration: &ProviderRegistration)
        -> Result<Value, BackendError>;

    /// `POST /chat/completions`
    async fn chat_completion(&self, request: &BackendChatRequest) -> Result<Value, BackendError>;

    /// `POST /embeddings`
    async fn embedding(&self, request: &BackendEmbeddingRequest) -> Result<Value, BackendError>;
}
