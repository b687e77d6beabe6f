//! AES-256-GCM envelope for stored API keys.
//!
//! Ciphertext is stored as `v1:` followed by base64 of `nonce || ciphertext`,
//! with a fresh 96-bit nonce per encryption.

use super::VaultError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const VERSION_PREFIX: &str = "v1:";

/// Symmetric cipher keyed by the process-wide secret.
#[derive(Clone)]
pub struct KeyCipher {
    key: [u8; KEY_LENGTH],
}

impl fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCipher").finish_non_exhaustive()
    }
}

impl KeyCipher {
    /// Derive the cipher key from a secret.
    ///
    /// A 64-char hex string or base64 of exactly 32 bytes is used as the raw
    /// key; any other non-empty passphrase is hashed with SHA-256.
    pub fn from_secret(secret: &str) -> Result<Self, VaultError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(VaultError::InvalidSecret("secret is empty".to_string()));
        }

        if secret.len() == KEY_LENGTH * 2 {
            if let Ok(bytes) = hex::decode(secret) {
                return Ok(Self::from_bytes(&bytes));
            }
        }
        if let Ok(bytes) = BASE64.decode(secret) {
            if bytes.len() == KEY_LENGTH {
                return Ok(Self::from_bytes(&bytes));
            }
        }

        let digest = Sha256::digest(secret.as_bytes());
        Ok(Self::from_bytes(&digest))
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&bytes[..KEY_LENGTH]);
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", VERSION_PREFIX, BASE64.encode(&combined)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, VaultError> {
        let payload = stored
            .trim()
            .strip_prefix(VERSION_PREFIX)
            .ok_or_else(|| VaultError::Decryption("unknown ciphertext format".to_string()))?;

        let combined = BASE64
            .decode(payload)
            .map_err(|e| VaultError::Decryption(format!("invalid base64: {}", e)))?;

        // GCM appends a 16-byte tag, so anything this short is truncated.
        if combined.len() <= NONCE_LENGTH {
            return Err(VaultError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LENGTH);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| VaultError::Decryption(e.to_string()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                VaultError::Decryption("invalid key or corrupted data".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| VaultError::Decryption("plaintext is not UTF-8".to_string()))
    }
}

/// SHA-256 hex digest of a plaintext key, used for duplicate detection.
pub fn key_hash(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}
