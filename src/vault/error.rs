//! Error types for credential vault operations.

use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    /// The tenant already stored this exact key for the provider.
    #[error("Credential already stored for provider {provider_id}")]
    DuplicateCredential { provider_id: i64 },

    /// No tenant default and no environment fallback for the provider.
    #[error("No API key available for provider '{provider}'")]
    NoCredentialAvailable { provider: String },

    #[error("Credential {0} not found")]
    CredentialNotFound(i64),

    /// Stored ciphertext could not be reversed with the current secret.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Invalid encryption secret: {0}")]
    InvalidSecret(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
