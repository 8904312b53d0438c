//! Authentication and rate-limit middleware for Axum

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

use super::{ApiKeyValidator, AuthContext, AuthError, API_KEY_PREFIX};
use crate::api::error::{rate_limited, unauthorized, ApiError, ErrorCode};

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Resolves the `Authorization` header to an [`AuthContext`]
pub struct Authenticator {
    api_key_validator: Arc<ApiKeyValidator>,
}

impl Authenticator {
    pub fn new(api_key_validator: Arc<ApiKeyValidator>) -> Self {
        Self { api_key_validator }
    }

    /// Authenticate a request
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<AuthContext, AuthError> {
        let header = auth_header.ok_or(AuthError::MissingAuth)?;

        if let Some(key) = header
            .strip_prefix("ApiKey ")
            .or_else(|| header.strip_prefix("Bearer "))
        {
            return self.api_key_validator.validate(key);
        }

        if header.starts_with(API_KEY_PREFIX) {
            return self.api_key_validator.validate(header);
        }

        Err(AuthError::MissingAuth)
    }
}

/// Auth context extension for request
#[derive(Clone)]
pub struct AuthContextExt(pub AuthContext);

/// Authentication middleware configuration/state.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub authenticator: Arc<Authenticator>,
    /// If false, requests are treated as authorized (dev mode).
    pub require_auth: bool,
}

/// Require an API key on internal routes
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let context = match state.authenticator.authenticate(auth_header) {
        Ok(context) => context,
        Err(e) if state.require_auth => {
            warn!(error = %e, path = %request.uri().path(), "internal request rejected");
            return auth_error_response(e);
        }
        Err(_) => AuthContext::anonymous(),
    };

    request.extensions_mut().insert(AuthContextExt(context));
    next.run(request).await
}

/// Per-address rate limit on federation routes
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let connect_info = request.extensions().get::<ConnectInfo<SocketAddr>>();
    let key = limiter
        .proxies
        .client_address(request.headers(), connect_info)
        .unwrap_or_else(|| "unknown".to_string());

    if let Err(e) = limiter.check(&key) {
        warn!(client = %key, "federation rate limit exceeded");
        return auth_error_response(e);
    }

    next.run(request).await
}

/// How many reverse proxies in front of the service append to
/// `X-Forwarded-For`.
///
/// With none configured the header is ignored and the socket peer is the
/// caller. Behind `n` proxies the caller is the `n`-th entry from the right;
/// entries further left were supplied by the client and are never used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    hops: usize,
}

impl TrustedProxies {
    pub fn hops(hops: usize) -> Self {
        Self { hops }
    }

    pub fn client_address(
        &self,
        headers: &HeaderMap,
        connect_info: Option<&ConnectInfo<SocketAddr>>,
    ) -> Option<String> {
        let peer = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
        if self.hops == 0 {
            return peer;
        }

        let forwarded: Vec<&str> = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();

        // Fewer entries than proxies: the chain is not the configured one.
        forwarded
            .len()
            .checked_sub(self.hops)
            .and_then(|i| forwarded.get(i))
            .map(|addr| addr.to_string())
            .or(peer)
    }
}

/// Convert auth error to HTTP response
fn auth_error_response(error: AuthError) -> Response {
    let api_error = match error {
        AuthError::MissingAuth => unauthorized("Missing authentication"),
        AuthError::InvalidApiKey => ApiError::new(ErrorCode::InvalidApiKey, "Invalid API key"),
        AuthError::RateLimited => rate_limited(RATE_WINDOW.as_secs()),
    };
    api_error.into_response()
}

/// Fixed-window request limiter keyed by caller
pub struct RateLimiter {
    requests_per_minute: u32,
    proxies: TrustedProxies,
    counts: Mutex<HashMap<String, (u32, Instant)>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            proxies: TrustedProxies::default(),
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.proxies = proxies;
        self
    }

    /// Check if request is allowed
    pub fn check(&self, key: &str) -> Result<(), AuthError> {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        // Drop expired windows so the map stays bounded by active callers.
        counts.retain(|_, (_, started)| now.duration_since(*started) < RATE_WINDOW);

        let entry = counts.entry(key.to_string()).or_insert((0, now));
        if entry.0 >= self.requests_per_minute {
            return Err(AuthError::RateLimited);
        }
        entry.0 += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter() {
        let limiter = RateLimiter::new(5);
        let key = "203.0.113.9";

        for _ in 0..5 {
            assert!(limiter.check(key).is_ok());
        }
        assert!(matches!(limiter.check(key), Err(AuthError::RateLimited)));
        assert!(limiter.check("198.51.100.1").is_ok());
    }

    #[test]
    fn test_authenticate_header_forms() {
        let validator = Arc::new(ApiKeyValidator::new());
        validator.register_plaintext("cap_secret", "bootstrap");
        let authenticator = Authenticator::new(validator);

        assert!(authenticator.authenticate(Some("ApiKey cap_secret")).is_ok());
        assert!(authenticator.authenticate(Some("Bearer cap_secret")).is_ok());
        assert!(authenticator.authenticate(Some("cap_secret")).is_ok());
        assert!(matches!(
            authenticator.authenticate(None),
            Err(AuthError::MissingAuth)
        ));
        assert!(matches!(
            authenticator.authenticate(Some("ApiKey cap_wrong")),
            Err(AuthError::InvalidApiKey)
        ));
    }

    #[test]
    fn test_forwarded_for_ignored_without_trusted_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "192.0.2.1".parse().unwrap());
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)));
        let proxies = TrustedProxies::default();

        assert_eq!(
            proxies.client_address(&headers, Some(&peer)).as_deref(),
            Some("127.0.0.1")
        );
        assert_eq!(proxies.client_address(&headers, None), None);
    }

    #[test]
    fn test_forwarded_for_takes_entry_appended_by_outermost_proxy() {
        let peer = ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 4000)));
        let mut headers = HeaderMap::new();
        // Client forged the first entry; the proxy appended the real one.
        headers.insert("x-forwarded-for", "6.6.6.6, 198.51.100.7".parse().unwrap());

        assert_eq!(
            TrustedProxies::hops(1)
                .client_address(&headers, Some(&peer))
                .as_deref(),
            Some("198.51.100.7")
        );
        assert_eq!(
            TrustedProxies::hops(2)
                .client_address(&headers, Some(&peer))
                .as_deref(),
            Some("6.6.6.6")
        );
        assert_eq!(
            TrustedProxies::hops(3)
                .client_address(&headers, Some(&peer))
                .as_deref(),
            Some("10.0.0.2")
        );
    }

    #[test]
    fn test_forwarded_for_across_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded-for", "6.6.6.6".parse().unwrap());
        headers.append("x-forwarded-for", "203.0.113.4".parse().unwrap());

        assert_eq!(
            TrustedProxies::hops(1)
                .client_address(&headers, None)
                .as_deref(),
            Some("203.0.113.4")
        );
    }
}
