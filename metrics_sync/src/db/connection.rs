//! SQLite connection helpers.

use anyhow::Context;
use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

use super::{migrate, sqlite_path};

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let path = sqlite_path(database_url);
    let mut conn = SqliteConnection::establish(path)
        .with_context(|| format!("opening sqlite database {path}"))?;

    // Readers never block the single writer.
    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

/// Bring the schema up to date, then connect. Every subcommand that touches tables
/// goes through here so a brand-new database file just reads as empty.
pub fn open_migrated(database_url: &str) -> anyhow::Result<SqliteConnection> {
    migrate::run_sqlite(database_url)?;
    connect_sqlite(database_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::{StoredUniverse, UniverseProvider};

    #[test]
    fn fresh_database_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.db").to_string_lossy().to_string();

        let mut conn = open_migrated(&path).unwrap();
        assert!(StoredUniverse.list_entities(&mut conn).unwrap().is_empty());

        // A second open finds nothing left to apply.
        drop(conn);
        assert_eq!(migrate::run_sqlite(&path).unwrap(), 0);
    }
}
