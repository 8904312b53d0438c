//! Shared request and response types for REST API handlers.
//!
//! The federation types are also what [`crate::federation::FederationClient`]
//! sends and parses, so both sides of a peer exchange agree on the shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccessLogEntry, AccessType, ArtifactId, DenialReason};

// ============================================================================
// Artifact creation (internal)
// ============================================================================

/// Request body for creating an artifact.
#[derive(Debug, Deserialize)]
pub struct CreateArtifactRequest {
    /// Plaintext, standard base64
    pub plaintext_b64: String,
    #[serde(default)]
    pub access_type: Option<AccessType>,
    #[serde(default)]
    pub trusted_domains: Option<Vec<String>>,
    #[serde(default)]
    pub expires_in_secs: Option<i64>,
}

/// Response for artifact creation. `token` is the only copy of the key.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateArtifactResponse {
    pub artifact_id: ArtifactId,
    pub token: String,
}

// ============================================================================
// Federation
// ============================================================================

/// Request body for a peer fetch.
#[derive(Debug, Serialize, Deserialize)]
pub struct FetchArtifactRequest {
    pub artifact_id: ArtifactId,
    /// Unpadded base64url, as in the token's key fragment
    pub access_key: String,
    pub requesting_domain: String,
}

/// Successful fetch: stored bytes, standard base64.
#[derive(Debug, Serialize, Deserialize)]
pub struct FetchArtifactResponse {
    pub ciphertext_b64: String,
    pub nonce_b64: String,
}

/// Request body for verification-only checks.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyKeyRequest {
    pub artifact_id: ArtifactId,
    pub access_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyKeyResponse {
    pub valid: bool,
    pub reason: Option<DenialReason>,
}

// ============================================================================
// Access history (internal)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessLogEntryResponse {
    pub id: Uuid,
    pub requesting_domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requesting_address: Option<String>,
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<DenialReason>,
    pub timestamp: DateTime<Utc>,
}

impl From<AccessLogEntry> for AccessLogEntryResponse {
    fn from(entry: AccessLogEntry) -> Self {
        Self {
            id: entry.id,
            requesting_domain: entry.requesting_domain,
            requesting_address: entry.requesting_address,
            granted: entry.granted,
            denial_reason: entry.denial_reason,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessHistoryResponse {
    pub artifact_id: ArtifactId,
    pub entries: Vec<AccessLogEntryResponse>,
}
