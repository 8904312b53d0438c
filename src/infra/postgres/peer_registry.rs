//! PostgreSQL-backed federation peer registry

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, FromRow};
use tracing::{info, instrument};

use crate::domain::{PeerEntry, TrustLevel, UnknownVariant};
use crate::infra::{CapsuleError, PeerRegistry, Result};

/// PostgreSQL peer registry
pub struct PgPeerRegistry {
    pool: PgPool,
}

impl PgPeerRegistry {
    /// Create a new PostgreSQL peer registry
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PeerRegistry for PgPeerRegistry {
    async fn is_trusted(&self, domain: &str, minimum_level: TrustLevel) -> Result<bool> {
        Ok(self
            .get(domain)
            .await?
            .is_some_and(|peer| peer.permits(minimum_level)))
    }

    #[instrument(skip(self))]
    async fn register(
        &self,
        domain: &str,
        trust_level: TrustLevel,
        enabled: bool,
    ) -> Result<PeerEntry> {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(CapsuleError::InvalidInput("peer domain must not be empty".into()));
        }

        let row = sqlx::query_as::<_, PeerRow>(
            r#"
            INSERT INTO peers (domain, trust_level, federation_enabled)
            VALUES ($1, $2, $3)
            ON CONFLICT (domain) DO UPDATE SET
                trust_level = EXCLUDED.trust_level,
                federation_enabled = EXCLUDED.federation_enabled,
                updated_at = NOW()
            RETURNING domain, trust_level, federation_enabled, created_at, updated_at
            "#,
        )
        .bind(domain)
        .bind(trust_level.as_str())
        .bind(enabled)
        .fetch_one(&self.pool)
        .await?;

        info!(domain, trust_level = trust_level.as_str(), enabled, "peer registered");
        PeerEntry::try_from(row)
    }

    #[instrument(skip(self))]
    async fn revoke(&self, domain: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM peers WHERE domain = $1")
            .bind(domain)
            .execute(&self.pool)
            .await?;

        let existed = result.rows_affected() > 0;
        if existed {
            info!(domain, "peer revoked");
        }
        Ok(existed)
    }

    async fn get(&self, domain: &str) -> Result<Option<PeerEntry>> {
        let row = sqlx::query_as::<_, PeerRow>(
            r#"
            SELECT domain, trust_level, federation_enabled, created_at, updated_at
            FROM peers
            WHERE domain = $1
            "#,
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PeerEntry::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<PeerEntry>> {
        let rows = sqlx::query_as::<_, PeerRow>(
            r#"
            SELECT domain, trust_level, federation_enabled, created_at, updated_at
            FROM peers
            ORDER BY domain ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PeerEntry::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct PeerRow {
    domain: String,
    trust_level: String,
    federation_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PeerRow> for PeerEntry {
    type Error = CapsuleError;

    fn try_from(row: PeerRow) -> Result<Self> {
        let trust_level = row
            .trust_level
            .parse()
            .map_err(|e: UnknownVariant| CapsuleError::CorruptRecord(e.to_string()))?;

        Ok(PeerEntry {
            domain: row.domain,
            trust_level,
            federation_enabled: row.federation_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
