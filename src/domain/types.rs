//! Core identifiers and enumerations shared across the capsule store,
//! the peer registry, and the federation gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque artifact identifier.
///
/// Freshly created artifacts get a UUID v4; identifiers arriving over the
/// wire are accepted as-is and simply fail lookup if unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether the id can be embedded in a capability token.
    ///
    /// Ids must be non-empty and free of `/` and `#` so the token's
    /// delimiters stay unambiguous.
    pub fn is_token_safe(&self) -> bool {
        is_token_safe_id(&self.0)
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

pub(crate) fn is_token_safe_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '#'])
}

/// How an artifact may be accessed.
///
/// Only [`AccessType::Token`] is served by the gateway; the gated variants
/// are reserved so stored rows can carry them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    #[default]
    Token,
    TimeGated,
    ProximityGated,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Token => "token",
            AccessType::TimeGated => "time-gated",
            AccessType::ProximityGated => "proximity-gated",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token" => Ok(AccessType::Token),
            "time-gated" => Ok(AccessType::TimeGated),
            "proximity-gated" => Ok(AccessType::ProximityGated),
            other => Err(UnknownVariant::new("access type", other)),
        }
    }
}

/// Trust granted to a federation peer.
///
/// Variants are declared in ascending order so `Ord` expresses
/// "at least as trusted as".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Public,
    Trusted,
    Owner,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Public => "public",
            TrustLevel::Trusted => "trusted",
            TrustLevel::Owner => "owner",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(TrustLevel::Public),
            "trusted" => Ok(TrustLevel::Trusted),
            "owner" => Ok(TrustLevel::Owner),
            other => Err(UnknownVariant::new("trust level", other)),
        }
    }
}

/// Why the gateway refused a fetch.
///
/// The string forms are part of the wire contract and the access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotFound,
    Expired,
    UntrustedDomain,
    InvalidKey,
    UnsupportedAccessType,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::NotFound => "not_found",
            DenialReason::Expired => "expired",
            DenialReason::UntrustedDomain => "untrusted_domain",
            DenialReason::InvalidKey => "invalid_key",
            DenialReason::UnsupportedAccessType => "unsupported_access_type",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DenialReason {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_found" => Ok(DenialReason::NotFound),
            "expired" => Ok(DenialReason::Expired),
            "untrusted_domain" => Ok(DenialReason::UntrustedDomain),
            "invalid_key" => Ok(DenialReason::InvalidKey),
            "unsupported_access_type" => Ok(DenialReason::UnsupportedAccessType),
            other => Err(UnknownVariant::new("denial reason", other)),
        }
    }
}

/// A stored or configured string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
