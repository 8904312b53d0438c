//! Creating artifacts and minting their capability tokens

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::crypto::{encrypt, CapabilityToken, KeyVerificationHash};
use crate::domain::{AccessType, ArtifactId, NewArtifact};
use crate::infra::{ArtifactStore, CapsuleError, Result};
use crate::metrics::{metric_names, MetricsRegistry};

/// Per-artifact options chosen by the owner.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub access_type: AccessType,
    /// Empty means "defer to the peer registry".
    pub trusted_domains: Vec<String>,
    pub expires_in: Option<Duration>,
}

impl PublishOptions {
    pub fn with_trusted_domains(mut self, domains: Vec<String>) -> Self {
        self.trusted_domains = domains;
        self
    }

    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    pub fn with_access_type(mut self, access_type: AccessType) -> Self {
        self.access_type = access_type;
        self
    }
}

/// Encrypts plaintext under a fresh key, stores only the ciphertext and the
/// key's verification hash, and returns the token that carries the key.
pub struct ArtifactPublisher {
    store: Arc<dyn ArtifactStore>,
    metrics: Arc<MetricsRegistry>,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The returned token is the only copy of the key; it cannot be
    /// recovered from the store afterwards.
    #[instrument(skip(self, plaintext, options), fields(plaintext_len = plaintext.len()))]
    pub async fn create(
        &self,
        plaintext: &[u8],
        owning_domain: &str,
        options: PublishOptions,
    ) -> Result<(ArtifactId, CapabilityToken)> {
        let owning_domain = owning_domain.trim();
        if owning_domain.is_empty() {
            return Err(CapsuleError::InvalidInput("owning domain must not be empty".into()));
        }
        let trusted_domains = normalize_domains(options.trusted_domains)?;
        let expires_at = match options.expires_in {
            Some(ttl) if ttl <= Duration::zero() => {
                return Err(CapsuleError::InvalidInput("expiry must be in the future".into()));
            }
            Some(ttl) => Some(Utc::now() + ttl),
            None => None,
        };

        let sealed = encrypt(plaintext).map_err(|e| CapsuleError::Encryption(e.to_string()))?;
        let new_artifact = NewArtifact::new(
            owning_domain,
            sealed.ciphertext,
            sealed.nonce,
            KeyVerificationHash::of(&sealed.key),
        )
        .with_access_type(options.access_type)
        .with_trusted_domains(trusted_domains)
        .with_expiry(expires_at);

        let artifact_id = self.store.create(new_artifact).await?;
        let token = CapabilityToken::new(owning_domain, artifact_id.clone(), &sealed.key)
            .map_err(|e| CapsuleError::InvalidInput(e.to_string()))?;

        self.metrics.inc_counter(metric_names::ARTIFACTS_CREATED).await;
        info!(artifact_id = %artifact_id, access_type = options.access_type.as_str(), "artifact created");
        Ok((artifact_id, token))
    }
}

fn normalize_domains(domains: Vec<String>) -> Result<Vec<String>> {
    let mut normalized = Vec::with_capacity(domains.len());
    for domain in domains {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(CapsuleError::InvalidInput("trusted domain must not be empty".into()));
        }
        if !normalized.iter().any(|d: &String| d == domain) {
            normalized.push(domain.to_string());
        }
    }
    Ok(normalized)
}
