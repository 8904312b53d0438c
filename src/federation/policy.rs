//! Trust policy for cross-domain fetches

use tracing::debug;

use crate::domain::{Artifact, TrustLevel};
use crate::infra::{PeerRegistry, Result};

/// Minimum registry trust a requesting domain needs when an artifact has no
/// allow-list of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FederationPolicy {
    pub minimum_trust: TrustLevel,
}

impl FederationPolicy {
    pub fn new(minimum_trust: TrustLevel) -> Self {
        Self { minimum_trust }
    }
}

impl Default for FederationPolicy {
    fn default() -> Self {
        Self::new(TrustLevel::Trusted)
    }
}

/// Decide whether `requesting_domain` may fetch `artifact`.
///
/// A non-empty `trusted_domains` list is authoritative and the registry is
/// not consulted. Otherwise the domain must be registered, enabled and at or
/// above the policy's minimum trust. Unknown domains are denied.
pub async fn evaluate(
    policy: &FederationPolicy,
    artifact: &Artifact,
    requesting_domain: &str,
    registry: &dyn PeerRegistry,
) -> Result<bool> {
    if requesting_domain.is_empty() {
        debug!(artifact_id = %artifact.id, "blank requesting domain");
        return Ok(false);
    }

    if artifact.has_allow_list() {
        let allowed = artifact
            .trusted_domains
            .iter()
            .any(|domain| domain == requesting_domain);
        debug!(artifact_id = %artifact.id, requesting_domain, allowed, "allow-list decision");
        return Ok(allowed);
    }

    let trusted = registry
        .is_trusted(requesting_domain, policy.minimum_trust)
        .await?;
    debug!(
        artifact_id = %artifact.id,
        requesting_domain,
        minimum_trust = policy.minimum_trust.as_str(),
        trusted,
        "registry decision"
    );
    Ok(trusted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{ArtifactKey, KeyVerificationHash};
    use crate::domain::{AccessType, ArtifactId};
    use crate::infra::MockPeerRegistry;
    use chrono::Utc;

    fn artifact(trusted_domains: Vec<&str>) -> Artifact {
        Artifact {
            id: ArtifactId::from("artifact-1"),
            owning_domain: "a.example".to_string(),
            ciphertext: vec![0u8; 32],
            nonce: [0u8; 12],
            key_verification_hash: KeyVerificationHash::of(&ArtifactKey::generate()),
            access_type: AccessType::Token,
            trusted_domains: trusted_domains.into_iter().map(String::from).collect(),
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn allow_list_is_authoritative() {
        let mut registry = MockPeerRegistry::new();
        registry.expect_is_trusted().never();
        let policy = FederationPolicy::default();
        let artifact = artifact(vec!["b.example"]);

        assert!(evaluate(&policy, &artifact, "b.example", &registry).await.unwrap());
        assert!(!evaluate(&policy, &artifact, "c.example", &registry).await.unwrap());
    }

    #[tokio::test]
    async fn registry_decides_without_allow_list() {
        let mut registry = MockPeerRegistry::new();
        registry
            .expect_is_trusted()
            .withf(|domain, minimum| domain == "b.example" && *minimum == TrustLevel::Public)
            .times(1)
            .returning(|_, _| Ok(true));
        let policy = FederationPolicy::new(TrustLevel::Public);

        assert!(evaluate(&policy, &artifact(vec![]), "b.example", &registry)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn registry_denial_is_propagated() {
        let mut registry = MockPeerRegistry::new();
        registry.expect_is_trusted().returning(|_, _| Ok(false));

        assert!(!evaluate(&FederationPolicy::default(), &artifact(vec![]), "c.example", &registry)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn blank_domain_is_denied_without_lookup() {
        let mut registry = MockPeerRegistry::new();
        registry.expect_is_trusted().never();
        let policy = FederationPolicy::new(TrustLevel::Public);

        assert!(!evaluate(&policy, &artifact(vec![]), "", &registry).await.unwrap());
        assert!(!evaluate(&policy, &artifact(vec!["b.example"]), "", &registry)
            .await
            .unwrap());
    }

    #[test]
    fn default_minimum_is_trusted() {
        assert_eq!(FederationPolicy::default().minimum_trust, TrustLevel::Trusted);
    }
}
