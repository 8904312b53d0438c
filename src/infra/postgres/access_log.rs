//! PostgreSQL-backed append-only access log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, FromRow};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{AccessLogEntry, ArtifactId, DenialReason};
use crate::infra::{AccessLog, CapsuleError, Result};

/// PostgreSQL access log
pub struct PgAccessLog {
    pool: PgPool,
}

impl PgAccessLog {
    /// Create a new PostgreSQL access log
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessLog for PgAccessLog {
    #[instrument(skip(self, entry), fields(artifact_id = %entry.artifact_id, granted = entry.granted))]
    async fn append(&self, entry: &AccessLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO access_log (
                id, artifact_id, requesting_domain, requesting_address,
                granted, denial_reason, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.artifact_id.as_str())
        .bind(&entry.requesting_domain)
        .bind(entry.requesting_address.as_deref())
        .bind(entry.granted)
        .bind(entry.denial_reason.map(|r| r.as_str()))
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn history(&self, artifact_id: &ArtifactId) -> Result<Vec<AccessLogEntry>> {
        let rows = sqlx::query_as::<_, AccessLogRow>(
            r#"
            SELECT id, artifact_id, requesting_domain, requesting_address,
                   granted, denial_reason, timestamp
            FROM access_log
            WHERE artifact_id = $1
            ORDER BY timestamp ASC, seq ASC
            "#,
        )
        .bind(artifact_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AccessLogEntry::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct AccessLogRow {
    id: Uuid,
    artifact_id: String,
    requesting_domain: String,
    requesting_address: Option<String>,
    granted: bool,
    denial_reason: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<AccessLogRow> for AccessLogEntry {
    type Error = CapsuleError;

    fn try_from(row: AccessLogRow) -> Result<Self> {
        let denial_reason = row
            .denial_reason
            .as_deref()
            .map(str::parse::<DenialReason>)
            .transpose()
            .map_err(|e| CapsuleError::CorruptRecord(e.to_string()))?;

        Ok(AccessLogEntry {
            id: row.id,
            artifact_id: ArtifactId::from(row.artifact_id),
            requesting_domain: row.requesting_domain,
            requesting_address: row.requesting_address,
            granted: row.granted,
            denial_reason,
            timestamp: row.timestamp,
        })
    }
}
