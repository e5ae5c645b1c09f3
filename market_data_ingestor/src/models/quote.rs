//! Canonical in-memory representation of a real-time quote.
//!
//! This struct is the standard output of [`QuoteProvider::fetch_quote`](crate::providers::QuoteProvider::fetch_quote)
//! regardless of which vendor served it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest quote for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Current (last traded) price. Always positive for a valid quote.
    pub current: Decimal,

    /// Previous session's close, the reference for the daily change.
    pub previous_close: Option<Decimal>,

    /// Session open price.
    pub open: Option<Decimal>,

    /// Session high.
    pub high: Option<Decimal>,

    /// Session low.
    pub low: Option<Decimal>,

    /// Provider timestamp of the quote. Not all providers supply this.
    pub timestamp: Option<DateTime<Utc>>,
}
