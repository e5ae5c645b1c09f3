//! Embedded schema migrations.

use anyhow::{Context, anyhow};
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use super::sqlite_path;

/// Embedded Diesel migrations bundled with this crate.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on the SQLite database at `url`.
///
/// Sets WAL journaling first; returns the number of migrations applied.
pub fn run_sqlite(url: &str) -> anyhow::Result<usize> {
    let path = sqlite_path(url);
    let mut conn = SqliteConnection::establish(path)
        .with_context(|| format!("opening sqlite database {path}"))?;
    conn.batch_execute("PRAGMA journal_mode=WAL;")?;

    let applied = conn.run_pending_migrations(MIGRATIONS).map_err(|e| anyhow!(e))?;
    for version in &applied {
        info!(%version, "applied migration");
    }
    Ok(applied.len())
}
