//! Structured API error responses with error codes
//!
//! Internal endpoints answer with a structured [`ApiError`]. Federation
//! endpoints answer denials with the bare `{"error": "<reason>"}` shape
//! peers expect, via [`DenialResponse`].

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::DenialReason;
use crate::infra::CapsuleError;

// ============================================================================
// Error Codes
// ============================================================================

/// Machine-readable code carried in every [`ApiError`] body and in the
/// `x-error-code` header. Values are stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 1xxx: caller identity
    AuthRequired,
    InvalidApiKey,

    // 2xxx: throttling
    RateLimitExceeded,

    // 3xxx: request validation
    InvalidFieldValue,

    // 4xxx: lookups
    ArtifactNotFound,

    // 6xxx: crypto
    EncryptionError,

    // 8xxx: server side
    DatabaseError,
    /// Backing store not reachable (readiness)
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    /// Numeric form, grouped by category
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::AuthRequired => 1001,
            ErrorCode::InvalidApiKey => 1002,
            ErrorCode::RateLimitExceeded => 2001,
            ErrorCode::InvalidFieldValue => 3001,
            ErrorCode::ArtifactNotFound => 4001,
            ErrorCode::EncryptionError => 6005,
            ErrorCode::DatabaseError => 8001,
            ErrorCode::ServiceUnavailable => 8002,
            ErrorCode::InternalError => 8999,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::AuthRequired | ErrorCode::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,
            ErrorCode::ArtifactNotFound => StatusCode::NOT_FOUND,
            ErrorCode::EncryptionError
            | ErrorCode::DatabaseError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            ErrorCode::EncryptionError => "ENCRYPTION_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for internal endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Retry information for rate limiting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    /// Related resource ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                retry_after: None,
                resource_id: None,
            },
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.error.retry_after = Some(seconds);
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.error.code;
        let mut response = (status, Json(self)).into_response();

        response.headers_mut().insert(
            HeaderName::from_static("x-error-code"),
            HeaderValue::from_static(code.as_str()),
        );

        response
    }
}

// ============================================================================
// Conversion from CapsuleError
// ============================================================================

impl From<CapsuleError> for ApiError {
    fn from(err: CapsuleError) -> Self {
        match err {
            CapsuleError::ArtifactNotFound(id) => {
                ApiError::new(ErrorCode::ArtifactNotFound, format!("Artifact not found: {id}"))
                    .with_resource_id(id.into_inner())
            }
            CapsuleError::InvalidInput(msg) => ApiError::new(ErrorCode::InvalidFieldValue, msg),
            CapsuleError::Encryption(_) => {
                ApiError::new(ErrorCode::EncryptionError, "Encryption failed")
            }
            // Storage details stay in the server log.
            err @ (CapsuleError::Database(_)
            | CapsuleError::Migration(_)
            | CapsuleError::CorruptRecord(_)) => {
                tracing::error!(error = %err, "storage failure");
                ApiError::new(ErrorCode::DatabaseError, "Storage unavailable")
            }
            err @ (CapsuleError::Configuration(_) | CapsuleError::Internal(_)) => {
                tracing::error!(error = %err, "internal failure");
                ApiError::new(ErrorCode::InternalError, "Internal error")
            }
        }
    }
}

// ============================================================================
// Federation denials
// ============================================================================

/// Status code for a denied federation request
pub fn denial_status(reason: DenialReason) -> StatusCode {
    match reason {
        DenialReason::NotFound => StatusCode::NOT_FOUND,
        DenialReason::Expired => StatusCode::GONE,
        DenialReason::UntrustedDomain
        | DenialReason::InvalidKey
        | DenialReason::UnsupportedAccessType => StatusCode::FORBIDDEN,
    }
}

/// `{"error": "<reason>"}` body returned to peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialResponse {
    pub error: DenialReason,
}

impl IntoResponse for DenialResponse {
    fn into_response(self) -> Response {
        (denial_status(self.error), Json(self)).into_response()
    }
}

/// Denial-shaped body for federation requests whose JSON does not parse
pub const MALFORMED_REQUEST: &str = "malformed_request";

/// Rejection for federation bodies: `{"error": "malformed_request"}` with the
/// status axum chose (400, 415 or 422).
#[derive(Debug)]
pub struct MalformedRequest(pub JsonRejection);

impl From<JsonRejection> for MalformedRequest {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection)
    }
}

impl IntoResponse for MalformedRequest {
    fn into_response(self) -> Response {
        let status = self.0.status();
        tracing::warn!(%status, error = %self.0.body_text(), "malformed federation request");
        (status, Json(serde_json::json!({ "error": MALFORMED_REQUEST }))).into_response()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Create a validation error for a request field
pub fn validation_error(field: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidFieldValue, format!("{field}: {}", message.into()))
}

/// 429 with the window length as `retry_after`
pub fn rate_limited(retry_after_seconds: u64) -> ApiError {
    ApiError::new(ErrorCode::RateLimitExceeded, "Rate limit exceeded")
        .with_retry_after(retry_after_seconds)
}

/// 401 for missing credentials
pub fn unauthorized(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::AuthRequired, message.into())
}
