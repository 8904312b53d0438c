//! Access log entries recorded for every fetch attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ArtifactId, DenialReason};

/// One fetch attempt, granted or denied. Entries are never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub artifact_id: ArtifactId,
    pub requesting_domain: String,
    pub requesting_address: Option<String>,
    pub granted: bool,
    pub denial_reason: Option<DenialReason>,
    pub timestamp: DateTime<Utc>,
}

impl AccessLogEntry {
    pub fn granted(artifact_id: ArtifactId, requesting_domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact_id,
            requesting_domain: requesting_domain.into(),
            requesting_address: None,
            granted: true,
            denial_reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn denied(
        artifact_id: ArtifactId,
        requesting_domain: impl Into<String>,
        reason: DenialReason,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact_id,
            requesting_domain: requesting_domain.into(),
            requesting_address: None,
            granted: false,
            denial_reason: Some(reason),
            timestamp: Utc::now(),
        }
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.requesting_address = address;
        self
    }
}
