//! API key authentication for internal endpoints
//!
//! Keys are formatted as `cap_<random>` and only their SHA-256 hash is kept.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{AuthContext, AuthError};

/// API key prefix
pub const API_KEY_PREFIX: &str = "cap_";

/// Registered key metadata
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    /// Hash of the API key (never store plaintext)
    pub key_hash: String,

    /// Human-readable name shown in logs
    pub label: String,

    /// Whether the key is active
    pub active: bool,
}

/// API key validator
pub struct ApiKeyValidator {
    keys: RwLock<HashMap<String, ApiKeyRecord>>,
}

impl ApiKeyValidator {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a new API key
    ///
    /// Returns (plaintext_key, key_hash)
    pub fn generate_key() -> (String, String) {
        let mut random_bytes = [0u8; 24];
        rand::rngs::OsRng.fill_bytes(&mut random_bytes);
        let random_part = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            random_bytes,
        );

        let plaintext_key = format!("{API_KEY_PREFIX}{random_part}");
        let key_hash = Self::hash_key(&plaintext_key);
        (plaintext_key, key_hash)
    }

    /// Hash an API key for storage
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Register a key by its hash
    pub fn register_key(&self, record: ApiKeyRecord) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(record.key_hash.clone(), record);
    }

    /// Hash and register a plaintext key
    pub fn register_plaintext(&self, key: &str, label: impl Into<String>) {
        self.register_key(ApiKeyRecord {
            key_hash: Self::hash_key(key),
            label: label.into(),
            active: true,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Validate an API key and return auth context
    pub fn validate(&self, key: &str) -> Result<AuthContext, AuthError> {
        let key_hash = Self::hash_key(key.trim());

        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let record = keys.get(&key_hash).ok_or(AuthError::InvalidApiKey)?;

        if !record.active {
            return Err(AuthError::InvalidApiKey);
        }

        Ok(AuthContext {
            key_label: record.label.clone(),
        })
    }
}

impl Default for ApiKeyValidator {
    fn default() -> Self {
        Self::new()
    }
}
