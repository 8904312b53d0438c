//! Infrastructure layer for capsule federation
//!
//! Contains trait definitions and implementations for:
//! - Artifact storage (PostgreSQL, SQLite)
//! - Federation peer registry
//! - Append-only access log

mod database;
mod error;
pub mod postgres;
pub mod sqlite;
mod traits;

pub use database::{Database, Stores};
pub use error::*;
pub use postgres::{PgAccessLog, PgArtifactStore, PgPeerRegistry};
pub use sqlite::{SqliteAccessLog, SqliteArtifactStore, SqlitePeerRegistry};
pub use traits::*;
