//! SQLite-backed federation peer registry

use chrono::Utc;
use sqlx::{sqlite::SqlitePool, FromRow};
use tracing::{info, instrument};

use super::{format_timestamp, parse_timestamp};
use crate::domain::{PeerEntry, TrustLevel};
use crate::infra::{CapsuleError, PeerRegistry, Result};

/// SQLite peer registry
pub struct SqlitePeerRegistry {
    pool: SqlitePool,
}

impl SqlitePeerRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PeerRegistry for SqlitePeerRegistry {
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
        let now = format_timestamp(&Utc::now());

        let row = sqlx::query_as::<_, PeerRow>(
            r#"
            INSERT INTO peers (domain, trust_level, federation_enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(domain) DO UPDATE SET
                trust_level = excluded.trust_level,
                federation_enabled = excluded.federation_enabled,
                updated_at = excluded.updated_at
            RETURNING domain, trust_level, federation_enabled, created_at, updated_at
            "#,
        )
        .bind(domain)
        .bind(trust_level.as_str())
        .bind(enabled)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        info!(domain, trust_level = trust_level.as_str(), enabled, "peer registered");
        PeerEntry::try_from(row)
    }

    #[instrument(skip(self))]
    async fn revoke(&self, domain: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM peers WHERE domain = ?")
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
            WHERE domain = ?
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
    created_at: String,
    updated_at: String,
}

impl TryFrom<PeerRow> for PeerEntry {
    type Error = CapsuleError;

    fn try_from(row: PeerRow) -> Result<Self> {
        Ok(PeerEntry {
            trust_level: row
                .trust_level
                .parse()
                .map_err(|e: crate::domain::UnknownVariant| CapsuleError::CorruptRecord(e.to_string()))?,
            federation_enabled: row.federation_enabled,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            domain: row.domain,
        })
    }
}
