//! Authentication for internal endpoints and rate limiting for federation
//!
//! Federation endpoints are authorized by the capability token itself and
//! carry no credentials. Internal endpoints (artifact creation and access
//! history) require an API key.
//!
//! # Authentication
//!
//! - **API Keys**: SHA-256 hashed in memory, presented as `ApiKey <key>`,
//!   `Bearer <key>` or the bare key in the `Authorization` header
//!
//! # Rate Limiting
//!
//! Fixed one-minute window per client address on federation routes.
//!
//! # Configuration
//!
//! - `AUTH_MODE`: `required` (default) or `disabled` for development
//! - `INTERNAL_API_KEY`: bootstrap key for internal routes
//! - `FEDERATION_RATE_LIMIT_PER_MINUTE`: per-address federation limit

mod api_key;
mod middleware;

pub use api_key::*;
pub use middleware::*;

/// Identity of an authenticated internal caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Label of the API key used, for logs
    pub key_label: String,
}

impl AuthContext {
    /// Context used when `AUTH_MODE=disabled`
    pub fn anonymous() -> Self {
        Self {
            key_label: "anonymous".to_string(),
        }
    }
}

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authentication")]
    MissingAuth,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("rate limit exceeded")]
    RateLimited,
}
