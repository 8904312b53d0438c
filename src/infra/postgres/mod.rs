//! PostgreSQL implementations for production deployments
//!
//! Provides the artifact store, peer registry and access log backed by a
//! shared connection pool.

mod access_log;
mod artifact_store;
mod peer_registry;

pub use access_log::PgAccessLog;
pub use artifact_store::PgArtifactStore;
pub use peer_registry::PgPeerRegistry;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::infra::Result;

/// Open a pool for `url`; migrations are applied separately.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    Ok(pool)
}
