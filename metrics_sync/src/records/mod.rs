//! Persistence gateway for per-entity metrics records.
//!
//! One [`EntityMetricsRecord`] exists per tracked symbol. It is created with null
//! metrics the first time the symbol is seen and afterwards only replaced as a
//! whole by [`MetricsRepo::record_upsert`]. Records are never deleted here.
//!
//! The SQLite implementation lives in [`repo`].

pub mod repo;

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    models::{EntityMetricsRow, EntityMetricsWrite},
    tz,
};

pub use repo::SqliteRepo;

/// Errors raised by the persistence gateway.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The database itself cannot be reached; nothing else in the run can succeed.
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
    /// A statement failed.
    #[error("query failed: {0}")]
    Query(#[source] DieselError),
    /// A write would move `last_updated_date` backwards.
    #[error("{symbol}: last_updated_date would regress from {stored} to {attempted}")]
    Regression {
        /// Record key.
        symbol: String,
        /// Date currently stored.
        stored: NaiveDate,
        /// Date the rejected write carried.
        attempted: NaiveDate,
    },
    /// A stored value cannot be parsed back.
    #[error("{symbol}: corrupt {column} value {value:?}")]
    Corrupt {
        /// Record key.
        symbol: String,
        /// Column holding the bad value.
        column: &'static str,
        /// Raw stored text.
        value: String,
    },
    /// A write was missing a field every refreshed record has.
    #[error("{symbol}: incomplete record, missing {field}")]
    Incomplete {
        /// Record key.
        symbol: String,
        /// Missing field.
        field: &'static str,
    },
}

impl StoreError {
    /// True when the gateway itself is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Only failed statements are worth a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Query(_))
    }
}

/// SQLite result texts for a database that can no longer take writes.
const UNWRITABLE: [&str; 4] = [
    "readonly database",
    "disk I/O error",
    "database or disk is full",
    "unable to open database file",
];

impl From<DieselError> for StoreError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::DatabaseError(kind, info)
                if matches!(
                    kind,
                    DatabaseErrorKind::ClosedConnection
                        | DatabaseErrorKind::UnableToSendCommand
                        | DatabaseErrorKind::ReadOnlyTransaction
                ) || UNWRITABLE.iter().any(|m| info.message().contains(m)) =>
            {
                StoreError::Unavailable(info.message().to_string())
            }
            DieselError::BrokenTransactionManager => {
                StoreError::Unavailable("broken transaction manager".to_string())
            }
            other => StoreError::Query(other),
        }
    }
}

/// Result type used throughout the persistence gateway.
pub type StoreResult<T> = Result<T, StoreError>;

/// Stored metrics for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityMetricsRecord {
    pub symbol: String,
    pub name: Option<String>,
    /// Trading date of the last successful refresh; `None` until the first one.
    pub last_updated_date: Option<NaiveDate>,
    pub price: Option<Decimal>,
    pub daily_change: Option<Decimal>,
    pub daily_change_percent: Option<Decimal>,
    pub monthly_change: Option<Decimal>,
    pub monthly_change_percent: Option<Decimal>,
    pub yearly_change: Option<Decimal>,
    pub yearly_change_percent: Option<Decimal>,
    pub open_price: Option<Decimal>,
    pub high_price: Option<Decimal>,
    pub low_price: Option<Decimal>,
    pub previous_close: Option<Decimal>,
    pub market_cap: Option<i64>,
    pub pe_ratio: Option<Decimal>,
    pub price_to_book: Option<Decimal>,
    pub dividend_yield: Option<Decimal>,
    pub sector: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntityMetricsRecord {
    /// A never-refreshed record.
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }
}

fn dec_text(v: Option<Decimal>) -> Option<String> {
    v.map(|d| d.normalize().to_string())
}

fn text_dec(symbol: &str, column: &'static str, v: Option<String>) -> StoreResult<Option<Decimal>> {
    v.map(|s| {
        Decimal::from_str(&s).map_err(|_| StoreError::Corrupt {
            symbol: symbol.to_string(),
            column,
            value: s,
        })
    })
    .transpose()
}

impl From<&EntityMetricsRecord> for EntityMetricsWrite {
    fn from(r: &EntityMetricsRecord) -> Self {
        EntityMetricsWrite {
            symbol: r.symbol.clone(),
            name: r.name.clone(),
            last_updated_date: r.last_updated_date.map(tz::date_to_text),
            price: dec_text(r.price),
            daily_change: dec_text(r.daily_change),
            daily_change_percent: dec_text(r.daily_change_percent),
            monthly_change: dec_text(r.monthly_change),
            monthly_change_percent: dec_text(r.monthly_change_percent),
            yearly_change: dec_text(r.yearly_change),
            yearly_change_percent: dec_text(r.yearly_change_percent),
            open_price: dec_text(r.open_price),
            high_price: dec_text(r.high_price),
            low_price: dec_text(r.low_price),
            previous_close: dec_text(r.previous_close),
            market_cap: r.market_cap,
            pe_ratio: dec_text(r.pe_ratio),
            price_to_book: dec_text(r.price_to_book),
            dividend_yield: dec_text(r.dividend_yield),
            sector: r.sector.clone(),
            updated_at: r.updated_at.map(tz::to_rfc3339_nanos),
        }
    }
}

impl TryFrom<EntityMetricsRow> for EntityMetricsRecord {
    type Error = StoreError;

    fn try_from(row: EntityMetricsRow) -> StoreResult<Self> {
        let sym = row.symbol.as_str();
        let corrupt = |column: &'static str, value: &str| StoreError::Corrupt {
            symbol: sym.to_string(),
            column,
            value: value.to_string(),
        };

        let last_updated_date = row
            .last_updated_date
            .as_deref()
            .map(|s| tz::parse_date(s).map_err(|_| corrupt("last_updated_date", s)))
            .transpose()?;
        let updated_at = row
            .updated_at
            .as_deref()
            .map(|s| tz::parse_ts_to_utc(s).map_err(|_| corrupt("updated_at", s)))
            .transpose()?;

        Ok(EntityMetricsRecord {
            last_updated_date,
            updated_at,
            name: row.name,
            price: text_dec(sym, "price", row.price)?,
            daily_change: text_dec(sym, "daily_change", row.daily_change)?,
            daily_change_percent: text_dec(sym, "daily_change_percent", row.daily_change_percent)?,
            monthly_change: text_dec(sym, "monthly_change", row.monthly_change)?,
            monthly_change_percent: text_dec(
                sym,
                "monthly_change_percent",
                row.monthly_change_percent,
            )?,
            yearly_change: text_dec(sym, "yearly_change", row.yearly_change)?,
            yearly_change_percent: text_dec(
                sym,
                "yearly_change_percent",
                row.yearly_change_percent,
            )?,
            open_price: text_dec(sym, "open_price", row.open_price)?,
            high_price: text_dec(sym, "high_price", row.high_price)?,
            low_price: text_dec(sym, "low_price", row.low_price)?,
            previous_close: text_dec(sym, "previous_close", row.previous_close)?,
            market_cap: row.market_cap,
            pe_ratio: text_dec(sym, "pe_ratio", row.pe_ratio)?,
            price_to_book: text_dec(sym, "price_to_book", row.price_to_book)?,
            dividend_yield: text_dec(sym, "dividend_yield", row.dividend_yield)?,
            sector: row.sector,
            symbol: row.symbol,
        })
    }
}

/// Portable surface, SQLite implementation lives in `repo.rs`.
pub trait MetricsRepo {
    /// Creates a null record for every symbol that has none. Returns how many were created.
    fn ensure_records(
        &self,
        conn: &mut diesel::SqliteConnection,
        symbols: &[String],
    ) -> StoreResult<usize>;

    /// Reads one record.
    fn record_get(
        &self,
        conn: &mut diesel::SqliteConnection,
        symbol: &str,
    ) -> StoreResult<Option<EntityMetricsRecord>>;

    /// Reads every record, ordered by symbol.
    fn records_all(
        &self,
        conn: &mut diesel::SqliteConnection,
    ) -> StoreResult<Vec<EntityMetricsRecord>>;

    /// Latest stored close for `symbol` on or before `date`.
    fn close_on_or_before(
        &self,
        conn: &mut diesel::SqliteConnection,
        symbol: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<Decimal>>;

    /// Atomically replaces the record and stores that day's close.
    ///
    /// `record.last_updated_date` and `record.price` must be set. A date older than
    /// the stored one is rejected with [`StoreError::Regression`].
    fn record_upsert(
        &self,
        conn: &mut diesel::SqliteConnection,
        record: &EntityMetricsRecord,
    ) -> StoreResult<()>;
}
