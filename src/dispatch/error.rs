//! Public error type of the gateway's operations.

use crate::backend::BackendError;
use crate::store::StoreError;
use crate::vault::VaultError;
use thiserror::Error;

/// Generic reply used where a conversational answer is expected.
pub const GENERIC_APOLOGY: &str =
    "I'm sorry, I couldn't generate a response right now. Please try again in a moment.";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Inference backend timed out after {0}ms")]
    BackendTimeout(u64),

    /// Transport failure after the retry budget was spent.
    #[error("Inference backend unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Inference backend error: {message}")]
    Upstream { status: Option<u16>, message: String },

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Continuous generation is disabled for agent {0}")]
    GenerationDisabled(i64),

    #[error("Agent {0} not found")]
    AgentNotFound(i64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout(ms) => Self::BackendTimeout(ms),
            BackendError::Network(message) => Self::InferenceUnavailable(message),
            BackendError::Upstream {
                status, message, ..
            } => Self::Upstream {
                status: Some(status),
                message,
            },
            BackendError::InvalidResponse(message) => Self::Upstream {
                status: None,
                message,
            },
        }
    }
}

impl GatewayError {
    /// Text suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Vault(VaultError::NoCredentialAvailable { provider }) => format!(
                "Add an API key for provider '{}' to continue.",
                provider
            ),
            Self::Vault(VaultError::DuplicateCredential { .. }) => {
                "This API key is already saved for this provider.".to_string()
            }
            Self::Vault(VaultError::CredentialNotFound(_)) => {
                "That API key no longer exists.".to_string()
            }
            Self::Vault(VaultError::Decryption(_)) => {
                "A stored API key could not be read. Re-enter the key for this provider.".to_string()
            }
            Self::Vault(_) | Self::Store(_) => {
                "A storage problem prevented this request. Please retry.".to_string()
            }
            Self::BackendTimeout(_) | Self::InferenceUnavailable(_) | Self::Upstream { .. } => {
                GENERIC_APOLOGY.to_string()
            }
            Self::InvalidEmbedding(_) => {
                "The embedding service returned an invalid vector. Please retry.".to_string()
            }
            Self::GenerationDisabled(_) => {
                "Continuous generation is not enabled for this agent.".to_string()
            }
            Self::AgentNotFound(_) => "Agent not found.".to_string(),
        }
    }

    /// Timeouts and transport failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendTimeout(_) | Self::InferenceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_mapping() {
        assert!(matches!(
            GatewayError::from(BackendError::Timeout(500)),
            GatewayError::BackendTimeout(500)
        ));
        assert!(GatewayError::from(BackendError::Network("refused".into())).is_unavailable());
        assert!(matches!(
            GatewayError::from(BackendError::Upstream {
                status: 502,
                message: "bad gateway".into(),
                body: None
            }),
            GatewayError::Upstream { status: Some(502), .. }
        ));
    }

    #[test]
    fn test_user_messages_are_actionable() {
        let missing = GatewayError::from(VaultError::NoCredentialAvailable {
            provider: "openai".to_string(),
        });
        assert_eq!(
            missing.user_message(),
            "Add an API key for provider 'openai' to continue."
        );
        assert_eq!(
            GatewayError::BackendTimeout(1).user_message(),
            GENERIC_APOLOGY
        );
        assert!(GatewayError::GenerationDisabled(3)
            .user_message()
            .contains("not enabled"));
    }
}
