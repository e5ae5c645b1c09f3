use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// An entity that did not complete this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntity {
    pub symbol: String,
    pub cause: String,
    /// Failure was a retryable transport-level one (network, timeout, 5xx, 429).
    pub transient: bool,
}

/// Outcome of one bounded pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Trading date freshness was judged against.
    pub as_of: NaiveDate,
    /// Entities in the universe.
    pub universe: usize,
    /// Entities needing refresh before truncation.
    pub stale: usize,
    /// Entities picked for this run.
    pub selected: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedEntity>,
    /// Stopped early by a stop request; unprocessed entities were left untouched.
    pub interrupted: bool,
    /// Set when the whole run failed rather than individual entities.
    pub systemic_failure: Option<String>,
}

impl RunSummary {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            universe: 0,
            stale: 0,
            selected: 0,
            attempted: 0,
            succeeded: 0,
            failed: Vec::new(),
            interrupted: false,
            systemic_failure: None,
        }
    }

    pub fn failed_symbols(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.symbol.as_str()).collect()
    }

    pub fn is_systemic_failure(&self) -> bool {
        self.systemic_failure.is_some()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "as_of={} universe={} stale={} selected={} attempted={} succeeded={} failed={}",
            self.as_of,
            self.universe,
            self.stale,
            self.selected,
            self.attempted,
            self.succeeded,
            self.failed.len()
        )?;
        if !self.failed.is_empty() {
            write!(f, " [{}]", self.failed_symbols().join(","))?;
        }
        if self.interrupted {
            write!(f, " interrupted")?;
        }
        if let Some(reason) = &self.systemic_failure {
            write!(f, " systemic_failure=\"{reason}\"")?;
        }
        Ok(())
    }
}
