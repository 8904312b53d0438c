//! Capability token codec.
//!
//! A token is a self-contained string carrying the owning domain, the
//! artifact id and the raw key:
//!
//! ```text
//! {domain}/voice/{artifact_id}#{base64url(key)}
//! ```
//!
//! Decoding splits on the last `#` and then on the last `/voice/`. The key
//! segment is base64url (no `#`) and artifact ids may not contain `/` or
//! `#`, so any domain string round-trips, even one containing `/`, `#` or a
//! port. The codec is pure and never touches server state.

use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::crypto::ArtifactKey;
use crate::domain::{is_token_safe_id, ArtifactId};

/// Separator between the domain and the artifact id.
pub const TOKEN_PATH_SEGMENT: &str = "/voice/";

/// Separator between the locator and the key fragment.
pub const TOKEN_KEY_SEPARATOR: char = '#';

/// The token string did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed capability token: {reason}")]
pub struct MalformedTokenError {
    reason: &'static str,
}

impl MalformedTokenError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }

    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

/// Encode bytes as base64url without padding
pub fn base64_url_encode(data: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, data)
}

/// Decode base64url (with or without padding)
pub fn base64_url_decode(s: &str) -> Option<Vec<u8>> {
    base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, s)
        .or_else(|_| base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE, s))
        .ok()
}

/// Encode `(domain, artifact_id, key)` into a token string.
pub fn encode(domain: &str, artifact_id: &str, key: &[u8]) -> Result<String, MalformedTokenError> {
    if domain.is_empty() {
        return Err(MalformedTokenError::new("empty domain"));
    }
    if !is_token_safe_id(artifact_id) {
        return Err(MalformedTokenError::new(
            "artifact id must be non-empty and contain no '/' or '#'",
        ));
    }
    if key.is_empty() {
        return Err(MalformedTokenError::new("empty key"));
    }

    Ok(format!(
        "{domain}{TOKEN_PATH_SEGMENT}{artifact_id}{TOKEN_KEY_SEPARATOR}{}",
        base64_url_encode(key)
    ))
}

/// Decode a token string back into `(domain, artifact_id, key)`.
pub fn decode(
    token: &str,
) -> Result<(String, String, Zeroizing<Vec<u8>>), MalformedTokenError> {
    let (locator, key_b64) = token
        .rsplit_once(TOKEN_KEY_SEPARATOR)
        .ok_or_else(|| MalformedTokenError::new("missing key fragment"))?;

    let (domain, artifact_id) = locator
        .rsplit_once(TOKEN_PATH_SEGMENT)
        .ok_or_else(|| MalformedTokenError::new("missing /voice/ segment"))?;

    if domain.is_empty() {
        return Err(MalformedTokenError::new("empty domain"));
    }
    if !is_token_safe_id(artifact_id) {
        return Err(MalformedTokenError::new("invalid artifact id"));
    }
    if key_b64.is_empty() {
        return Err(MalformedTokenError::new("empty key"));
    }

    let key = base64_url_decode(key_b64)
        .map(Zeroizing::new)
        .ok_or_else(|| MalformedTokenError::new("key is not valid base64url"))?;

    Ok((domain.to_string(), artifact_id.to_string(), key))
}

/// Parsed capability token.
#[derive(Clone, PartialEq, Eq)]
pub struct CapabilityToken {
    domain: String,
    artifact_id: ArtifactId,
    key: Zeroizing<Vec<u8>>,
}

impl CapabilityToken {
    pub fn new(
        domain: impl Into<String>,
        artifact_id: ArtifactId,
        key: &ArtifactKey,
    ) -> Result<Self, MalformedTokenError> {
        let domain = domain.into();
        if domain.is_empty() {
            return Err(MalformedTokenError::new("empty domain"));
        }
        if !artifact_id.is_token_safe() {
            return Err(MalformedTokenError::new("invalid artifact id"));
        }

        Ok(Self {
            domain,
            artifact_id,
            key: Zeroizing::new(key.as_bytes().to_vec()),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn artifact_id(&self) -> &ArtifactId {
        &self.artifact_id
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    /// The key as an AES-256 key, if it has the right length.
    pub fn artifact_key(&self) -> Option<ArtifactKey> {
        ArtifactKey::from_slice(&self.key)
    }

    /// Key segment as it travels on the wire (base64url, unpadded).
    pub fn access_key_b64(&self) -> String {
        base64_url_encode(&self.key)
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{TOKEN_PATH_SEGMENT}{}{TOKEN_KEY_SEPARATOR}{}",
            self.domain,
            self.artifact_id,
            base64_url_encode(&self.key)
        )
    }
}

impl FromStr for CapabilityToken {
    type Err = MalformedTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, artifact_id, key) = decode(s)?;
        Ok(Self {
            domain,
            artifact_id: ArtifactId::from(artifact_id),
            key,
        })
    }
}

impl fmt::Display for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityToken")
            .field("domain", &self.domain)
            .field("artifact_id", &self.artifact_id)
            .field("key", &"<redacted>")
            .finish()
    }
}
