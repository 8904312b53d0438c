//! Encrypted artifact records.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::crypto::{KeyVerificationHash, Nonce96};
use crate::domain::{AccessType, ArtifactId};

/// A stored capsule: ciphertext plus the metadata needed to decide who may
/// fetch it. The symmetric key is never part of this record.
#[derive(Clone, PartialEq)]
pub struct Artifact {
    pub id: ArtifactId,
    pub owning_domain: String,
    /// AEAD output, authentication tag included.
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce96,
    pub key_verification_hash: KeyVerificationHash,
    pub access_type: AccessType,
    /// Per-artifact allow-list; empty defers to the peer registry.
    pub trusted_domains: Vec<String>,
    pub access_count: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Artifact {
    /// Expiry is advisory: it is only consulted when a fetch arrives.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn has_allow_list(&self) -> bool {
        !self.trusted_domains.is_empty()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("id", &self.id)
            .field("owning_domain", &self.owning_domain)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("access_type", &self.access_type)
            .field("trusted_domains", &self.trusted_domains)
            .field("access_count", &self.access_count)
            .field("last_accessed_at", &self.last_accessed_at)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Everything the store needs to persist a new artifact.
///
/// No field can hold the raw key: the only
/// key-derived value is a [`KeyVerificationHash`].
#[derive(Clone)]
pub struct NewArtifact {
    pub owning_domain: String,
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce96,
    pub key_verification_hash: KeyVerificationHash,
    pub access_type: AccessType,
    pub trusted_domains: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewArtifact {
    pub fn new(
        owning_domain: impl Into<String>,
        ciphertext: Vec<u8>,
        nonce: Nonce96,
        key_verification_hash: KeyVerificationHash,
    ) -> Self {
        Self {
            owning_domain: owning_domain.into(),
            ciphertext,
            nonce,
            key_verification_hash,
            access_type: AccessType::Token,
            trusted_domains: Vec::new(),
            expires_at: None,
        }
    }

    pub fn with_access_type(mut self, access_type: AccessType) -> Self {
        self.access_type = access_type;
        self
    }

    pub fn with_trusted_domains(mut self, domains: Vec<String>) -> Self {
        self.trusted_domains = domains;
        self
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }
}

impl fmt::Debug for NewArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewArtifact")
            .field("owning_domain", &self.owning_domain)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("access_type", &self.access_type)
            .field("trusted_domains", &self.trusted_domains)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
