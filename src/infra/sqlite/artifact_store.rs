//! SQLite-backed artifact store

use chrono::Utc;
use sqlx::{sqlite::SqlitePool, FromRow};
use tracing::{debug, instrument};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::crypto::KeyVerificationHash;
use crate::domain::{AccessType, Artifact, ArtifactId, NewArtifact};
use crate::infra::{ArtifactStore, CapsuleError, Result};

/// SQLite artifact store
pub struct SqliteArtifactStore {
    pool: SqlitePool,
}

impl SqliteArtifactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ArtifactStore for SqliteArtifactStore {
    #[instrument(skip(self, artifact), fields(owning_domain = %artifact.owning_domain))]
    async fn create(&self, artifact: NewArtifact) -> Result<ArtifactId> {
        let id = ArtifactId::new();
        let trusted_domains = serde_json::to_string(&artifact.trusted_domains)
            .map_err(|e| CapsuleError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO artifacts (
                id, owning_domain, ciphertext, nonce, key_verification_hash,
                access_type, trusted_domains, access_count, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(&artifact.owning_domain)
        .bind(&artifact.ciphertext)
        .bind(artifact.nonce.as_slice())
        .bind(artifact.key_verification_hash.as_bytes().as_slice())
        .bind(artifact.access_type.as_str())
        .bind(&trusted_domains)
        .bind(format_timestamp(&Utc::now()))
        .bind(artifact.expires_at.as_ref().map(format_timestamp))
        .execute(&self.pool)
        .await?;

        debug!(artifact_id = %id, ciphertext_len = artifact.ciphertext.len(), "artifact stored");
        Ok(id)
    }

    #[instrument(skip(self), fields(artifact_id = %artifact_id))]
    async fn get(&self, artifact_id: &ArtifactId) -> Result<Option<Artifact>> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, owning_domain, ciphertext, nonce, key_verification_hash,
                   access_type, trusted_domains, access_count,
                   last_accessed_at, created_at, expires_at
            FROM artifacts
            WHERE id = ?
            "#,
        )
        .bind(artifact_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Artifact::try_from).transpose()
    }

    #[instrument(skip(self), fields(artifact_id = %artifact_id))]
    async fn record_access(&self, artifact_id: &ArtifactId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE artifacts SET access_count = access_count + 1, last_accessed_at = ? WHERE id = ?",
        )
        .bind(format_timestamp(&Utc::now()))
        .bind(artifact_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CapsuleError::ArtifactNotFound(artifact_id.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ArtifactRow {
    id: String,
    owning_domain: String,
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
    key_verification_hash: Vec<u8>,
    access_type: String,
    trusted_domains: String,
    access_count: i64,
    last_accessed_at: Option<String>,
    created_at: String,
    expires_at: Option<String>,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = CapsuleError;

    fn try_from(row: ArtifactRow) -> Result<Self> {
        let nonce = row
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| CapsuleError::CorruptRecord(format!("artifact {} nonce length", row.id)))?;
        let key_verification_hash = KeyVerificationHash::from_stored(&row.key_verification_hash)
            .ok_or_else(|| {
                CapsuleError::CorruptRecord(format!("artifact {} key hash length", row.id))
            })?;
        let access_type = row
            .access_type
            .parse::<AccessType>()
            .map_err(|e| CapsuleError::CorruptRecord(e.to_string()))?;
        let trusted_domains: Vec<String> = serde_json::from_str(&row.trusted_domains)
            .map_err(|e| CapsuleError::CorruptRecord(format!("trusted_domains: {e}")))?;

        Ok(Artifact {
            id: ArtifactId::from(row.id),
            owning_domain: row.owning_domain,
            ciphertext: row.ciphertext,
            nonce,
            key_verification_hash,
            access_type,
            trusted_domains,
            access_count: row.access_count.max(0) as u64,
            last_accessed_at: parse_optional_timestamp(row.last_accessed_at.as_deref())?,
            created_at: parse_timestamp(&row.created_at)?,
            expires_at: parse_optional_timestamp(row.expires_at.as_deref())?,
        })
    }
}
