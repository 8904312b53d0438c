//! PostgreSQL-backed artifact store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, FromRow};
use tracing::{debug, instrument};

use crate::crypto::KeyVerificationHash;
use crate::domain::{AccessType, Artifact, ArtifactId, NewArtifact};
use crate::infra::{ArtifactStore, CapsuleError, Result};

/// PostgreSQL artifact store
pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    /// Create a new PostgreSQL artifact store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    #[instrument(skip(self, artifact), fields(owning_domain = %artifact.owning_domain))]
    async fn create(&self, artifact: NewArtifact) -> Result<ArtifactId> {
        let id = ArtifactId::new();

        sqlx::query(
            r#"
            INSERT INTO artifacts (
                id, owning_domain, ciphertext, nonce, key_verification_hash,
                access_type, trusted_domains, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id.as_str())
        .bind(&artifact.owning_domain)
        .bind(&artifact.ciphertext)
        .bind(artifact.nonce.as_slice())
        .bind(artifact.key_verification_hash.as_bytes().as_slice())
        .bind(artifact.access_type.as_str())
        .bind(&artifact.trusted_domains)
        .bind(artifact.expires_at)
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
            WHERE id = $1
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
            r#"
            UPDATE artifacts
            SET access_count = access_count + 1, last_accessed_at = NOW()
            WHERE id = $1
            "#,
        )
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
    trusted_domains: Vec<String>,
    access_count: i64,
    last_accessed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
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

        Ok(Artifact {
            id: ArtifactId::from(row.id),
            owning_domain: row.owning_domain,
            ciphertext: row.ciphertext,
            nonce,
            key_verification_hash,
            access_type,
            trusted_domains: row.trusted_domains,
            access_count: row.access_count.max(0) as u64,
            last_accessed_at: row.last_accessed_at,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}
