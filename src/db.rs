pub mod connection;
pub mod executor;
pub mod migrations;
pub mod schema;
pub mod seed;

use serde::Serialize;

pub use connection::{check_connection_string, BackendMode, CheckStatus, ConnectionCheck, Db};

use crate::error::{DbError, DbResult};
use migrations::MigrationReport;
use seed::SeedReport;

#[derive(Clone, Debug, Serialize)]
pub struct Bootstrap {
    pub mode: BackendMode,
    pub migrations: MigrationReport,
    pub seed: Option<SeedReport>,
}

/// Creates the base tables, applies pending migrations and, when `seed` is
/// set, fills empty tables with the sample dataset. Safe to repeat.
pub async fn bootstrap(db: &Db, seed: bool) -> DbResult<Bootstrap> {
    if !schema::initialize(db).await {
        return Err(DbError::Schema);
    }
    let migrations = migrations::migrate(db).await?;
    let seed = if seed {
        Some(seed::seed_if_empty(db).await?)
    } else {
        None
    };
    Ok(Bootstrap {
        mode: db.mode(),
        migrations,
        seed,
    })
}

/// Drops every table and the helper view, then bootstraps from scratch.
pub async fn reset(db: &Db, seed: bool) -> DbResult<Bootstrap> {
    if !schema::drop_all(db).await {
        return Err(DbError::Schema);
    }
    bootstrap(db, seed).await
}
