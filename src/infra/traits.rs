//! Trait definitions for the capsule store, peer registry and access log

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{AccessLogEntry, Artifact, ArtifactId, NewArtifact, PeerEntry, TrustLevel};

use super::Result;

/// Persistent storage for encrypted artifacts.
///
/// Invariant: ciphertext and nonce are written once and never updated; the
/// only mutation is access bookkeeping via [`ArtifactStore::record_access`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a new artifact and return its freshly assigned id
    async fn create(&self, artifact: NewArtifact) -> Result<ArtifactId>;

    /// Load an artifact by id
    async fn get(&self, artifact_id: &ArtifactId) -> Result<Option<Artifact>>;

    /// Atomically increment `access_count` and stamp `last_accessed_at`.
    ///
    /// Implemented as a single UPDATE so concurrent fetches of the same
    /// artifact are all counted.
    async fn record_access(&self, artifact_id: &ArtifactId) -> Result<()>;
}

/// Registry of federation peers. Unknown domains are untrusted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeerRegistry: Send + Sync {
    /// Whether `domain` is registered, enabled and at least `minimum_level`
    async fn is_trusted(&self, domain: &str, minimum_level: TrustLevel) -> Result<bool>;

    /// Insert or replace a peer entry
    async fn register(
        &self,
        domain: &str,
        trust_level: TrustLevel,
        enabled: bool,
    ) -> Result<PeerEntry>;

    /// Remove a peer; returns whether an entry existed
    async fn revoke(&self, domain: &str) -> Result<bool>;

    /// Look up one peer
    async fn get(&self, domain: &str) -> Result<Option<PeerEntry>>;

    /// All registered peers, ordered by domain
    async fn list(&self) -> Result<Vec<PeerEntry>>;
}

/// Append-only audit log of fetch attempts.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccessLog: Send + Sync {
    /// Record one attempt
    async fn append(&self, entry: &AccessLogEntry) -> Result<()>;

    /// Entries for an artifact, oldest first
    async fn history(&self, artifact_id: &ArtifactId) -> Result<Vec<AccessLogEntry>>;
}
