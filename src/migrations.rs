//! Database migrations.
//!
//! Uses SQLx embedded migrations for both Postgres and SQLite deployments.

use sqlx::{PgPool, SqlitePool};

static POSTGRES_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/postgres");
static SQLITE_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/sqlite");

pub async fn run_postgres(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    POSTGRES_MIGRATOR.run(pool).await
}

pub async fn run_sqlite(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    SQLITE_MIGRATOR.run(pool).await
}
