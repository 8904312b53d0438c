//! End-to-end federation tests against in-memory SQLite.
//!
//! Covers the owner/peer flow at the library level and over real HTTP with
//! [`FederationClient`].

mod common;

use std::sync::Arc;

use chrono::Duration;
use capsule_federation::crypto::{decrypt, ArtifactKey, CapabilityToken};
use capsule_federation::domain::{DenialReason, TrustLevel};
use capsule_federation::federation::{
    ClientError, FederationClient, FetchOutcome, FetchRequest, PublishOptions,
};

use common::*;

async fn fetch_as(
    state: &capsule_federation::server::AppState,
    token: &CapabilityToken,
    domain: &str,
    key: &[u8],
) -> FetchOutcome {
    state
        .gateway
        .fetch(FetchRequest::new(
            token.artifact_id().clone(),
            key.to_vec(),
            domain,
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_hello_world_across_domains() {
    let state = owner_state().await;

    let (artifact_id, token) = state
        .publisher
        .create(b"Hello World", DOMAIN_A, PublishOptions::default())
        .await
        .unwrap();

    let encoded = token.encode();
    assert!(encoded.starts_with(&format!("{DOMAIN_A}/voice/{artifact_id}#")));

    // B parses the token it was handed and fetches with its key.
    let parsed: CapabilityToken = encoded.parse().unwrap();
    assert_eq!(parsed.domain(), DOMAIN_A);
    let FetchOutcome::Granted(fetched) =
        fetch_as(&state, &parsed, DOMAIN_B, parsed.key_bytes()).await
    else {
        panic!("trusted peer with correct key must be granted");
    };
    let plaintext = decrypt(&fetched.ciphertext, parsed.key_bytes(), &fetched.nonce).unwrap();
    assert_eq!(plaintext, b"Hello World");

    // Wrong key from a trusted peer.
    let wrong = ArtifactKey::generate();
    assert_eq!(
        fetch_as(&state, &parsed, DOMAIN_B, wrong.as_bytes()).await,
        FetchOutcome::Denied(DenialReason::InvalidKey)
    );

    // Correct key from an unregistered domain.
    assert_eq!(
        fetch_as(&state, &parsed, DOMAIN_C, parsed.key_bytes()).await,
        FetchOutcome::Denied(DenialReason::UntrustedDomain)
    );

    let history = state.access_log.history(&artifact_id).await.unwrap();
    let outcomes: Vec<_> = history
        .iter()
        .map(|e| (e.requesting_domain.as_str(), e.granted, e.denial_reason))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (DOMAIN_B, true, None),
            (DOMAIN_B, false, Some(DenialReason::InvalidKey)),
            (DOMAIN_C, false, Some(DenialReason::UntrustedDomain)),
        ]
    );
}

#[tokio::test]
async fn test_access_count_tracks_granted_fetches_only() {
    let state = owner_state().await;
    let (artifact_id, token) = state
        .publisher
        .create(b"memo", DOMAIN_A, PublishOptions::default())
        .await
        .unwrap();
    let store = state.database.stores().artifacts;

    for expected in 1..=3u64 {
        assert!(matches!(
            fetch_as(&state, &token, DOMAIN_B, token.key_bytes()).await,
            FetchOutcome::Granted(_)
        ));
        let artifact = store.get(&artifact_id).await.unwrap().unwrap();
        assert_eq!(artifact.access_count, expected);
    }

    fetch_as(&state, &token, DOMAIN_C, token.key_bytes()).await;
    fetch_as(&state, &token, DOMAIN_B, &[0u8; 32]).await;

    let artifact = store.get(&artifact_id).await.unwrap().unwrap();
    assert_eq!(artifact.access_count, 3);
    assert!(artifact.last_accessed_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_are_all_counted() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(file_backed_owner_state(&dir).await);
    let (artifact_id, token) = state
        .publisher
        .create(b"popular", DOMAIN_A, PublishOptions::default())
        .await
        .unwrap();
    let token = Arc::new(token);

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let state = state.clone();
            let token = token.clone();
            tokio::spawn(async move {
                fetch_as(&state, &token, DOMAIN_B, token.key_bytes()).await
            })
        })
        .collect();
    for task in tasks {
        assert!(matches!(task.await.unwrap(), FetchOutcome::Granted(_)));
    }

    let artifact = state
        .database
        .stores()
        .artifacts
        .get(&artifact_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.access_count, 20);
    assert_eq!(state.access_log.history(&artifact_id).await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_allow_list_overrides_registry() {
    let state = owner_state().await;
    let options = PublishOptions::default().with_trusted_domains(vec![DOMAIN_C.to_string()]);
    let (_, token) = state
        .publisher
        .create(b"for C only", DOMAIN_A, options)
        .await
        .unwrap();

    assert!(matches!(
        fetch_as(&state, &token, DOMAIN_C, token.key_bytes()).await,
        FetchOutcome::Granted(_)
    ));
    assert_eq!(
        fetch_as(&state, &token, DOMAIN_B, token.key_bytes()).await,
        FetchOutcome::Denied(DenialReason::UntrustedDomain)
    );
}

#[tokio::test]
async fn test_minimum_trust_is_configurable() {
    let strict = sqlite_state(DOMAIN_A, TrustLevel::Owner).await;
    strict
        .peers
        .register(DOMAIN_B, TrustLevel::Trusted, true)
        .await
        .unwrap();
    let (_, token) = strict
        .publisher
        .create(b"x", DOMAIN_A, PublishOptions::default())
        .await
        .unwrap();
    assert_eq!(
        fetch_as(&strict, &token, DOMAIN_B, token.key_bytes()).await,
        FetchOutcome::Denied(DenialReason::UntrustedDomain)
    );

    let open = sqlite_state(DOMAIN_A, TrustLevel::Public).await;
    open.peers
        .register(DOMAIN_B, TrustLevel::Public, true)
        .await
        .unwrap();
    let (_, token) = open
        .publisher
        .create(b"x", DOMAIN_A, PublishOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        fetch_as(&open, &token, DOMAIN_B, token.key_bytes()).await,
        FetchOutcome::Granted(_)
    ));
}

#[tokio::test]
async fn test_revoked_peer_is_denied() {
    let state = owner_state().await;
    let (_, token) = state
        .publisher
        .create(b"x", DOMAIN_A, PublishOptions::default())
        .await
        .unwrap();

    assert!(state.peers.revoke(DOMAIN_B).await.unwrap());
    assert_eq!(
        fetch_as(&state, &token, DOMAIN_B, token.key_bytes()).await,
        FetchOutcome::Denied(DenialReason::UntrustedDomain)
    );
}

#[tokio::test]
async fn test_expired_artifact_is_gone() {
    let state = owner_state().await;
    let options = PublishOptions::default().with_expires_in(Duration::milliseconds(1));
    let (artifact_id, token) = state
        .publisher
        .create(b"ephemeral", DOMAIN_A, options)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(
        fetch_as(&state, &token, DOMAIN_B, token.key_bytes()).await,
        FetchOutcome::Denied(DenialReason::Expired)
    );
    let history = state.access_log.history(&artifact_id).await.unwrap();
    assert_eq!(history[0].denial_reason, Some(DenialReason::Expired));
}

#[tokio::test]
async fn test_client_fetches_and_decrypts_over_http() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let owner_domain = listener.local_addr().unwrap().to_string();

    let state = sqlite_state(&owner_domain, TrustLevel::Trusted).await;
    state
        .peers
        .register(DOMAIN_B, TrustLevel::Trusted, true)
        .await
        .unwrap();
    let (_, token) = state
        .publisher
        .create(b"Hello World", &owner_domain, PublishOptions::default())
        .await
        .unwrap();

    let app = test_router(state, true, None);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let token: CapabilityToken = token.encode().parse().unwrap();

    let client_b = FederationClient::new(DOMAIN_B).unwrap().with_scheme("http");
    assert_eq!(client_b.fetch(&token).await.unwrap(), b"Hello World");

    let client_c = FederationClient::new(DOMAIN_C).unwrap().with_scheme("http");
    match client_c.fetch(&token).await {
        Err(ClientError::Denied(reason)) => assert_eq!(reason, DenialReason::UntrustedDomain),
        other => panic!("expected untrusted_domain denial, got {other:?}"),
    }
}
