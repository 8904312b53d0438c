//! Federation peer registry entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TrustLevel;

/// A domain that may be allowed to fetch artifacts from this store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub domain: String,
    pub trust_level: TrustLevel,
    pub federation_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PeerEntry {
    /// Enabled and at least `minimum` trusted.
    pub fn permits(&self, minimum: TrustLevel) -> bool {
        self.federation_enabled && self.trust_level >= minimum
    }
}
