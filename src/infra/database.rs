//! Backend selection by connection URL

use sqlx::postgres::PgPool;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

use super::{
    postgres, sqlite, AccessLog, ArtifactStore, CapsuleError, PeerRegistry, PgAccessLog,
    PgArtifactStore, PgPeerRegistry, Result, SqliteAccessLog, SqliteArtifactStore,
    SqlitePeerRegistry,
};

/// A connected pool for one of the supported backends
#[derive(Clone)]
pub enum Database {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// The three stores, sharing one pool
#[derive(Clone)]
pub struct Stores {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub peers: Arc<dyn PeerRegistry>,
    pub access_log: Arc<dyn AccessLog>,
}

impl Database {
    /// Connect to `postgres://` / `postgresql://` or `sqlite:` URLs.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Database::Postgres(postgres::connect(url, max_connections).await?))
        } else if url.starts_with("sqlite:") {
            Ok(Database::Sqlite(sqlite::connect(url, max_connections).await?))
        } else {
            Err(CapsuleError::Configuration(format!(
                "unsupported database URL scheme: {}",
                url.split(':').next().unwrap_or_default()
            )))
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Database::Postgres(_) => "postgres",
            Database::Sqlite(_) => "sqlite",
        }
    }

    /// Apply embedded migrations for this backend
    pub async fn migrate(&self) -> Result<()> {
        match self {
            Database::Postgres(pool) => crate::migrations::run_postgres(pool).await?,
            Database::Sqlite(pool) => crate::migrations::run_sqlite(pool).await?,
        }
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        match self {
            Database::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            Database::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub fn stores(&self) -> Stores {
        match self {
            Database::Postgres(pool) => Stores {
                artifacts: Arc::new(PgArtifactStore::new(pool.clone())),
                peers: Arc::new(PgPeerRegistry::new(pool.clone())),
                access_log: Arc::new(PgAccessLog::new(pool.clone())),
            },
            Database::Sqlite(pool) => Stores {
                artifacts: Arc::new(SqliteArtifactStore::new(pool.clone())),
                peers: Arc::new(SqlitePeerRegistry::new(pool.clone())),
                access_log: Arc::new(SqliteAccessLog::new(pool.clone())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_scheme_is_rejected() {
        let result = Database::connect("mysql://localhost/capsules", 1).await;
        assert!(matches!(result, Err(CapsuleError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_in_memory_sqlite_is_ready() {
        let database = Database::Sqlite(sqlite::connect_in_memory().await.unwrap());
        database.ping().await.unwrap();
        assert_eq!(database.backend_name(), "sqlite");

        let stores = database.stores();
        assert!(stores.peers.list().await.unwrap().is_empty());
    }
}
