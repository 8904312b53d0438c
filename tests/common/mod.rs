//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use capsule_federation::auth::{
    ApiKeyValidator, AuthMiddlewareState, Authenticator, RateLimiter,
};
use capsule_federation::domain::TrustLevel;
use capsule_federation::federation::FederationPolicy;
use capsule_federation::infra::{sqlite, Database};
use capsule_federation::metrics::MetricsRegistry;
use capsule_federation::server::{build_router, AppState};

/// Owning domain used by most tests
pub const DOMAIN_A: &str = "a.example";
/// Registered, trusted peer
pub const DOMAIN_B: &str = "b.example";
/// Never registered
pub const DOMAIN_C: &str = "c.example";

/// API key accepted by [`test_router`]
pub const TEST_API_KEY: &str = "cap_test_integration_key";

/// Application state over a fresh in-memory SQLite database.
pub async fn sqlite_state(local_domain: &str, minimum_trust: TrustLevel) -> AppState {
    let pool = sqlite::connect_in_memory().await.unwrap();
    AppState::new(
        local_domain,
        Database::Sqlite(pool),
        FederationPolicy::new(minimum_trust),
        Arc::new(MetricsRegistry::new()),
    )
}

/// State for `DOMAIN_A` with `DOMAIN_B` registered as trusted.
pub async fn owner_state() -> AppState {
    let state = sqlite_state(DOMAIN_A, TrustLevel::Trusted).await;
    state
        .peers
        .register(DOMAIN_B, TrustLevel::Trusted, true)
        .await
        .unwrap();
    state
}

/// State for `DOMAIN_A` over a file-backed SQLite database in `dir`, with
/// `DOMAIN_B` trusted. Unlike [`owner_state`], the pool holds several
/// connections, so concurrent requests really do race.
pub async fn file_backed_owner_state(dir: &tempfile::TempDir) -> AppState {
    let url = format!("sqlite://{}", dir.path().join("capsules.db").display());
    let database = Database::connect(&url, 8).await.unwrap();
    database.migrate().await.unwrap();

    let state = AppState::new(
        DOMAIN_A,
        database,
        FederationPolicy::new(TrustLevel::Trusted),
        Arc::new(MetricsRegistry::new()),
    );
    state
        .peers
        .register(DOMAIN_B, TrustLevel::Trusted, true)
        .await
        .unwrap();
    state
}

/// Full router with [`TEST_API_KEY`] registered.
pub fn test_router(
    state: AppState,
    require_auth: bool,
    rate_limiter: Option<Arc<RateLimiter>>,
) -> axum::Router {
    let api_key_validator = Arc::new(ApiKeyValidator::new());
    api_key_validator.register_plaintext(TEST_API_KEY, "integration");

    let auth_state = AuthMiddlewareState {
        authenticator: Arc::new(Authenticator::new(api_key_validator)),
        require_auth,
    };

    build_router(state, auth_state, rate_limiter)
}

/// Send a request to the test router.
pub async fn send_request(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    api_key: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    send_request_with_headers(app, method, uri, body, api_key, &[]).await
}

/// Send a request with extra headers to the test router.
pub async fn send_request_with_headers(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    api_key: Option<&str>,
    headers: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }

    if let Some(key) = api_key {
        builder = builder.header("authorization", format!("ApiKey {}", key));
    }

    let body = body
        .map(|v| Body::from(serde_json::to_vec(&v).unwrap()))
        .unwrap_or_else(|| Body::from(Vec::new()));

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();

    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes) }))
    };

    (status, json)
}

/// Standard base64
pub fn b64(data: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, data)
}

/// Standard base64 decode
pub fn unb64(data: &str) -> Vec<u8> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data).unwrap()
}
