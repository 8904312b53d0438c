//! Error types for capsule federation infrastructure

use thiserror::Error;

use crate::domain::ArtifactId;

/// Errors that can occur in the storage and service layers
#[derive(Error, Debug)]
pub enum CapsuleError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Artifact not found
    #[error("artifact not found: {0}")]
    ArtifactNotFound(ArtifactId),

    /// Stored row could not be decoded into a domain value
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// Encryption error
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Invalid input supplied by a caller
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for capsule operations
pub type Result<T> = std::result::Result<T, CapsuleError>;
