//! Federation gateway: the only path by which ciphertext leaves a domain

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use super::policy::{self, FederationPolicy};
use crate::crypto::Nonce96;
use crate::domain::{AccessLogEntry, AccessType, ArtifactId, DenialReason};
use crate::infra::{AccessLog, ArtifactStore, PeerRegistry, Result};
use crate::metrics::{metric_names, timed, MetricsRegistry};

/// A fetch attempt from a remote domain.
pub struct FetchRequest {
    pub artifact_id: ArtifactId,
    /// Raw key bytes decoded from the capability token. An undecodable key
    /// is passed as empty and fails verification.
    pub candidate_key: Zeroizing<Vec<u8>>,
    pub requesting_domain: String,
    pub requesting_address: Option<String>,
}

impl FetchRequest {
    pub fn new(
        artifact_id: ArtifactId,
        candidate_key: Vec<u8>,
        requesting_domain: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id,
            candidate_key: Zeroizing::new(candidate_key),
            requesting_domain: requesting_domain.into(),
            requesting_address: None,
        }
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.requesting_address = address;
        self
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("artifact_id", &self.artifact_id)
            .field("requesting_domain", &self.requesting_domain)
            .field("requesting_address", &self.requesting_address)
            .finish_non_exhaustive()
    }
}

/// Ciphertext and nonce exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce96,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Granted(FetchedArtifact),
    Denied(DenialReason),
}

/// Result of a verification-only check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(DenialReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            Verdict::Valid => None,
            Verdict::Invalid(reason) => Some(*reason),
        }
    }
}

/// Serves encrypted artifacts to peer domains that present a valid key and
/// pass the trust policy.
pub struct FederationGateway {
    store: Arc<dyn ArtifactStore>,
    peers: Arc<dyn PeerRegistry>,
    access_log: Arc<dyn AccessLog>,
    policy: FederationPolicy,
    metrics: Arc<MetricsRegistry>,
}

impl FederationGateway {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        peers: Arc<dyn PeerRegistry>,
        access_log: Arc<dyn AccessLog>,
        policy: FederationPolicy,
    ) -> Self {
        Self {
            store,
            peers,
            access_log,
            policy,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> &FederationPolicy {
        &self.policy
    }

    /// Evaluate a fetch and, if granted, count it and hand back the stored
    /// ciphertext. Every outcome is appended to the access log before
    /// returning. Errors are storage faults only; denials are `Ok`.
    #[instrument(
        skip(self, request),
        fields(artifact_id = %request.artifact_id, requesting_domain = %request.requesting_domain)
    )]
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome> {
        timed(&self.metrics, metric_names::FETCH_LATENCY, self.fetch_inner(request)).await
    }

    async fn fetch_inner(&self, request: FetchRequest) -> Result<FetchOutcome> {
        let Some(artifact) = self.store.get(&request.artifact_id).await? else {
            return self.deny(&request, DenialReason::NotFound).await;
        };

        if artifact.is_expired_at(Utc::now()) {
            return self.deny(&request, DenialReason::Expired).await;
        }

        if artifact.access_type != AccessType::Token {
            return self.deny(&request, DenialReason::UnsupportedAccessType).await;
        }

        let permitted = policy::evaluate(
            &self.policy,
            &artifact,
            &request.requesting_domain,
            self.peers.as_ref(),
        )
        .await?;
        if !permitted {
            return self.deny(&request, DenialReason::UntrustedDomain).await;
        }

        if !artifact.key_verification_hash.matches(&request.candidate_key) {
            return self.deny(&request, DenialReason::InvalidKey).await;
        }

        // Log before counting: every counted access has a granted entry.
        let entry = AccessLogEntry::granted(artifact.id.clone(), &request.requesting_domain)
            .with_address(request.requesting_address.clone());
        self.access_log.append(&entry).await?;
        self.store.record_access(&artifact.id).await?;
        self.metrics.inc_counter(metric_names::FETCH_GRANTED).await;

        info!(ciphertext_len = artifact.ciphertext.len(), "fetch granted");
        Ok(FetchOutcome::Granted(FetchedArtifact {
            ciphertext: artifact.ciphertext,
            nonce: artifact.nonce,
        }))
    }

    async fn deny(&self, request: &FetchRequest, reason: DenialReason) -> Result<FetchOutcome> {
        let entry =
            AccessLogEntry::denied(request.artifact_id.clone(), &request.requesting_domain, reason)
                .with_address(request.requesting_address.clone());
        self.access_log.append(&entry).await?;
        self.metrics.record_denial(reason).await;

        warn!(reason = reason.as_str(), "fetch denied");
        Ok(FetchOutcome::Denied(reason))
    }

    /// Check existence, expiry, access type and key without recording an
    /// access. A `Valid` verdict means a fetch with this key can succeed
    /// for a permitted domain.
    #[instrument(skip(self, candidate_key), fields(artifact_id = %artifact_id))]
    pub async fn verify(&self, artifact_id: &ArtifactId, candidate_key: &[u8]) -> Result<Verdict> {
        self.metrics.inc_counter(metric_names::VERIFY_REQUESTS).await;

        let verdict = match self.store.get(artifact_id).await? {
            None => Verdict::Invalid(DenialReason::NotFound),
            Some(artifact) if artifact.is_expired_at(Utc::now()) => {
                Verdict::Invalid(DenialReason::Expired)
            }
            Some(artifact) if artifact.access_type != AccessType::Token => {
                Verdict::Invalid(DenialReason::UnsupportedAccessType)
            }
            Some(artifact) if !artifact.key_verification_hash.matches(candidate_key) => {
                Verdict::Invalid(DenialReason::InvalidKey)
            }
            Some(_) => Verdict::Valid,
        };

        info!(
            valid = verdict.is_valid(),
            reason = verdict.reason().map(|r| r.as_str()),
            "key verification requested"
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{ArtifactKey, KeyVerificationHash};
    use crate::domain::Artifact;
    use crate::infra::{CapsuleError, MockAccessLog, MockArtifactStore, MockPeerRegistry};
    use chrono::Duration;

    struct Fixture {
        key: ArtifactKey,
        artifact: Artifact,
    }

    impl Fixture {
        fn new() -> Self {
            let key = ArtifactKey::generate();
            let artifact = Artifact {
                id: ArtifactId::from("artifact-1"),
                owning_domain: "a.example".to_string(),
                ciphertext: vec![7u8; 40],
                nonce: [3u8; 12],
                key_verification_hash: KeyVerificationHash::of(&key),
                access_type: AccessType::Token,
                trusted_domains: Vec::new(),
                access_count: 0,
                last_accessed_at: None,
                created_at: Utc::now(),
                expires_at: None,
            };
            Self { key, artifact }
        }

        fn request(&self, domain: &str) -> FetchRequest {
            FetchRequest::new(self.artifact.id.clone(), self.key.as_bytes().to_vec(), domain)
        }
    }

    fn store_returning(artifact: Option<Artifact>) -> MockArtifactStore {
        let mut store = MockArtifactStore::new();
        store
            .expect_get()
            .returning(move |_| Ok(artifact.clone()));
        store
    }

    fn registry_trusting(trusted: bool) -> MockPeerRegistry {
        let mut peers = MockPeerRegistry::new();
        peers.expect_is_trusted().returning(move |_, _| Ok(trusted));
        peers
    }

    fn log_expecting(granted: bool, reason: Option<DenialReason>) -> MockAccessLog {
        let mut log = MockAccessLog::new();
        log.expect_append()
            .withf(move |entry| entry.granted == granted && entry.denial_reason == reason)
            .times(1)
            .returning(|_| Ok(()));
        log
    }

    fn gateway(
        store: MockArtifactStore,
        peers: MockPeerRegistry,
        log: MockAccessLog,
    ) -> FederationGateway {
        FederationGateway::new(
            Arc::new(store),
            Arc::new(peers),
            Arc::new(log),
            FederationPolicy::default(),
        )
    }

    #[tokio::test]
    async fn grants_trusted_peer_with_valid_key() {
        let fixture = Fixture::new();
        let mut store = store_returning(Some(fixture.artifact.clone()));
        store.expect_record_access().times(1).returning(|_| Ok(()));
        let gateway = gateway(store, registry_trusting(true), log_expecting(true, None));

        let outcome = gateway.fetch(fixture.request("b.example")).await.unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Granted(FetchedArtifact {
                ciphertext: fixture.artifact.ciphertext.clone(),
                nonce: fixture.artifact.nonce,
            })
        );
    }

    #[tokio::test]
    async fn unknown_artifact_is_not_found() {
        let fixture = Fixture::new();
        let gateway = gateway(
            store_returning(None),
            MockPeerRegistry::new(),
            log_expecting(false, Some(DenialReason::NotFound)),
        );

        let outcome = gateway.fetch(fixture.request("b.example")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Denied(DenialReason::NotFound));
    }

    #[tokio::test]
    async fn expired_artifact_is_denied_before_policy() {
        let mut fixture = Fixture::new();
        fixture.artifact.expires_at = Some(Utc::now() - Duration::seconds(1));
        let mut peers = MockPeerRegistry::new();
        peers.expect_is_trusted().never();
        let gateway = gateway(
            store_returning(Some(fixture.artifact.clone())),
            peers,
            log_expecting(false, Some(DenialReason::Expired)),
        );

        let outcome = gateway.fetch(fixture.request("b.example")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Denied(DenialReason::Expired));
    }

    #[tokio::test]
    async fn untrusted_domain_is_denied_even_with_correct_key() {
        let fixture = Fixture::new();
        let mut store = store_returning(Some(fixture.artifact.clone()));
        store.expect_record_access().never();
        let gateway = gateway(
            store,
            registry_trusting(false),
            log_expecting(false, Some(DenialReason::UntrustedDomain)),
        );

        let outcome = gateway.fetch(fixture.request("c.example")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Denied(DenialReason::UntrustedDomain));
    }

    #[tokio::test]
    async fn wrong_key_is_invalid() {
        let fixture = Fixture::new();
        let mut store = store_returning(Some(fixture.artifact.clone()));
        store.expect_record_access().never();
        let gateway = gateway(
            store,
            registry_trusting(true),
            log_expecting(false, Some(DenialReason::InvalidKey)),
        );

        let request = FetchRequest::new(
            fixture.artifact.id.clone(),
            ArtifactKey::generate().as_bytes().to_vec(),
            "b.example",
        );
        let outcome = gateway.fetch(request).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Denied(DenialReason::InvalidKey));
    }

    #[tokio::test]
    async fn empty_key_is_invalid() {
        let fixture = Fixture::new();
        let gateway = gateway(
            store_returning(Some(fixture.artifact.clone())),
            registry_trusting(true),
            log_expecting(false, Some(DenialReason::InvalidKey)),
        );

        let request = FetchRequest::new(fixture.artifact.id.clone(), Vec::new(), "b.example");
        let outcome = gateway.fetch(request).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Denied(DenialReason::InvalidKey));
    }

    #[tokio::test]
    async fn non_token_access_type_is_unsupported() {
        let mut fixture = Fixture::new();
        fixture.artifact.access_type = AccessType::TimeGated;
        let gateway = gateway(
            store_returning(Some(fixture.artifact.clone())),
            MockPeerRegistry::new(),
            log_expecting(false, Some(DenialReason::UnsupportedAccessType)),
        );

        let outcome = gateway.fetch(fixture.request("b.example")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Denied(DenialReason::UnsupportedAccessType));
    }

    #[tokio::test]
    async fn failed_log_append_leaves_access_uncounted() {
        let fixture = Fixture::new();
        let mut store = store_returning(Some(fixture.artifact.clone()));
        store.expect_record_access().never();
        let mut log = MockAccessLog::new();
        log.expect_append()
            .times(1)
            .returning(|_| Err(CapsuleError::Internal("log unavailable".into())));
        let gateway = gateway(store, registry_trusting(true), log);

        assert!(gateway.fetch(fixture.request("b.example")).await.is_err());
    }

    #[tokio::test]
    async fn granted_entry_is_written_before_counting() {
        let fixture = Fixture::new();
        let mut sequence = mockall::Sequence::new();
        let mut log = MockAccessLog::new();
        log.expect_append()
            .withf(|entry| entry.granted)
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        let mut store = store_returning(Some(fixture.artifact.clone()));
        store
            .expect_record_access()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        let gateway = gateway(store, registry_trusting(true), log);

        let outcome = gateway.fetch(fixture.request("b.example")).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Granted(_)));
    }

    #[tokio::test]
    async fn verify_rejects_non_token_access_type() {
        for access_type in [AccessType::TimeGated, AccessType::ProximityGated] {
            let mut fixture = Fixture::new();
            fixture.artifact.access_type = access_type;
            let gateway = gateway(
                store_returning(Some(fixture.artifact.clone())),
                MockPeerRegistry::new(),
                MockAccessLog::new(),
            );

            let verdict = gateway
                .verify(&fixture.artifact.id, fixture.key.as_bytes())
                .await
                .unwrap();
            assert_eq!(verdict, Verdict::Invalid(DenialReason::UnsupportedAccessType));
        }
    }

    #[tokio::test]
    async fn denial_records_requesting_address() {
        let fixture = Fixture::new();
        let mut log = MockAccessLog::new();
        log.expect_append()
            .withf(|entry| entry.requesting_address.as_deref() == Some("192.0.2.10"))
            .times(1)
            .returning(|_| Ok(()));
        let gateway = gateway(store_returning(None), MockPeerRegistry::new(), log);

        let request = fixture
            .request("b.example")
            .with_address(Some("192.0.2.10".to_string()));
        gateway.fetch(request).await.unwrap();
    }

    #[tokio::test]
    async fn storage_fault_is_an_error_not_a_denial() {
        let fixture = Fixture::new();
        let mut store = MockArtifactStore::new();
        store
            .expect_get()
            .returning(|_| Err(CapsuleError::Internal("disk on fire".into())));
        let mut log = MockAccessLog::new();
        log.expect_append().never();
        let gateway = gateway(store, MockPeerRegistry::new(), log);

        assert!(gateway.fetch(fixture.request("b.example")).await.is_err());
    }

    #[tokio::test]
    async fn denials_are_counted_in_metrics() {
        let fixture = Fixture::new();
        let metrics = Arc::new(MetricsRegistry::new());
        let gateway = gateway(
            store_returning(None),
            MockPeerRegistry::new(),
            log_expecting(false, Some(DenialReason::NotFound)),
        )
        .with_metrics(metrics.clone());

        gateway.fetch(fixture.request("b.example")).await.unwrap();

        assert_eq!(
            metrics
                .get_counter(&metric_names::fetch_denied(DenialReason::NotFound))
                .await,
            1
        );
    }

    #[tokio::test]
    async fn verify_does_not_touch_counters_or_log() {
        let fixture = Fixture::new();
        let mut store = store_returning(Some(fixture.artifact.clone()));
        store.expect_record_access().never();
        let mut log = MockAccessLog::new();
        log.expect_append().never();
        let gateway = gateway(store, MockPeerRegistry::new(), log);

        let valid = gateway
            .verify(&fixture.artifact.id, fixture.key.as_bytes())
            .await
            .unwrap();
        let invalid = gateway
            .verify(&fixture.artifact.id, ArtifactKey::generate().as_bytes())
            .await
            .unwrap();

        assert_eq!(valid, Verdict::Valid);
        assert_eq!(invalid, Verdict::Invalid(DenialReason::InvalidKey));
        assert_eq!(invalid.reason(), Some(DenialReason::InvalidKey));
    }

    #[tokio::test]
    async fn verify_reports_missing_and_expired() {
        let mut fixture = Fixture::new();
        let gateway_missing = gateway(
            store_returning(None),
            MockPeerRegistry::new(),
            MockAccessLog::new(),
        );
        assert_eq!(
            gateway_missing
                .verify(&fixture.artifact.id, fixture.key.as_bytes())
                .await
                .unwrap(),
            Verdict::Invalid(DenialReason::NotFound)
        );

        fixture.artifact.expires_at = Some(Utc::now() - Duration::minutes(5));
        let gateway_expired = gateway(
            store_returning(Some(fixture.artifact.clone())),
            MockPeerRegistry::new(),
            MockAccessLog::new(),
        );
        assert_eq!(
            gateway_expired
                .verify(&fixture.artifact.id, fixture.key.as_bytes())
                .await
                .unwrap(),
            Verdict::Invalid(DenialReason::Expired)
        );
    }
}
