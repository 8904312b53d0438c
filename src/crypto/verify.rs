//! Key verification hashes and the access verifier.
//!
//! ```text
//! key_verification_hash = SHA256(b"CAPSULE_KEY_VERIFY_V1" || key)
//! ```
//!
//! Keys are 256-bit uniformly random, so an unsalted digest is enough to
//! make the stored value useless for recovering the key.

use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

use crate::crypto::ArtifactKey;

/// Domain separation prefix for key verification digests.
pub const DOMAIN_KEY_VERIFY: &[u8] = b"CAPSULE_KEY_VERIFY_V1";

/// Digest size (SHA-256)
pub const KEY_HASH_SIZE: usize = 32;

/// One-way digest of an artifact key.
///
/// Outside this crate it can only be obtained by hashing an
/// [`ArtifactKey`], so raw key bytes can never be passed where a hash is
/// expected.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyVerificationHash([u8; KEY_HASH_SIZE]);

impl KeyVerificationHash {
    pub fn of(key: &ArtifactKey) -> Self {
        Self(digest(key.as_bytes()))
    }

    /// Rehydrate a digest loaded from storage.
    pub(crate) fn from_stored(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_HASH_SIZE] {
        &self.0
    }

    /// Check a candidate key against this digest in constant time.
    pub fn matches(&self, candidate_key: &[u8]) -> bool {
        verify(candidate_key, &self.0)
    }
}

impl fmt::Debug for KeyVerificationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyVerificationHash(..)")
    }
}

fn digest(key: &[u8]) -> [u8; KEY_HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_KEY_VERIFY);
    hasher.update(key);
    hasher.finalize().into()
}

/// Compute the verification digest for raw key bytes.
pub fn hash_key(key: &[u8]) -> [u8; KEY_HASH_SIZE] {
    digest(key)
}

/// Decide whether `candidate_key` hashes to `stored_hash`.
///
/// Malformed input (empty key, wrong digest length) yields `false` rather
/// than an error. The comparison is constant-time in the digest bytes.
pub fn verify(candidate_key: &[u8], stored_hash: &[u8]) -> bool {
    if candidate_key.is_empty() || stored_hash.len() != KEY_HASH_SIZE {
        return false;
    }

    digest(candidate_key).ct_eq(stored_hash).into()
}
