//! The tracked entity universe.
//!
//! - [`config`]: the TOML universe file and its normalization.
//! - [`sync`]: reconciling the file into the `entities` table.
//! - [`provider`]: the run-time [`UniverseProvider`] surface, always in symbol order.

pub mod config;
pub mod provider;
pub mod sync;

use serde::Serialize;

pub use provider::{StaticUniverse, StoredUniverse, UniverseProvider};

/// A tracked market instrument.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Entity {
    /// Upper-case ticker.
    pub symbol: String,
    /// Display name, if known.
    pub name: Option<String>,
}

impl Entity {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
        }
    }

    pub fn named(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: Some(name.into()),
        }
    }
}

/// Canonical form of a ticker: trimmed and upper-cased.
///
/// Returns `None` for an empty ticker or one containing characters other than
/// ASCII letters, digits, `.` and `-`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let s = raw.trim().to_ascii_uppercase();
    let valid = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    valid.then_some(s)
}
