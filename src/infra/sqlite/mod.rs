//! SQLite implementations for single-node deployments and tests
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that text ordering matches time ordering.

mod access_log;
mod artifact_store;
mod peer_registry;

pub use access_log::SqliteAccessLog;
pub use artifact_store::SqliteArtifactStore;
pub use peer_registry::SqlitePeerRegistry;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::infra::{CapsuleError, Result};

/// Open a pool for `url`; migrations are applied separately.
///
/// WAL lets readers proceed alongside the single writer; concurrent writers
/// wait on the busy timeout instead of failing with `SQLITE_BUSY`.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory database with migrations applied.
///
/// Every pooled connection to `:memory:` would otherwise see its own empty
/// database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    crate::migrations::run_sqlite(&pool).await?;
    Ok(pool)
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CapsuleError::CorruptRecord(format!("invalid timestamp {s:?}: {e}")))
}

pub(crate) fn parse_optional_timestamp(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_timestamp).transpose()
}
