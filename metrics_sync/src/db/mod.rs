//! Database utilities for connections and schema migrations.
//!
//! - [`connection::connect_sqlite`] applies WAL, foreign_keys=ON, and a 5000ms busy_timeout.
//! - [`migrate::run_sqlite`] applies the embedded Diesel migrations.
//! - [`connection::open_migrated`] does both, in that order.
//!
//! Example:
//! ```no_run
//! use metrics_sync::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("metrics_sync_example.db");
//! migrate::run_sqlite(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;

/// Environment variable naming the SQLite database file.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Strips an optional `sqlite://` or `sqlite:` scheme so both URLs and bare paths work.
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}
