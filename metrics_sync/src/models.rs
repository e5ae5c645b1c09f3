//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::entities`]: the tracked universe
//! - [`crate::schema::entity_metrics`]: one metrics record per symbol, stored as text
//! - [`crate::schema::price_history`]: daily closes used for reference prices
//! - [`crate::schema::worker_lease`]: run lease rows
//!
//! Typed views over these rows live in [`crate::records`] and [`crate::lease`].

use diesel::prelude::*;

use crate::schema::*;

/// A row in [`crate::schema::entities`].
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = entities, primary_key(symbol), check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntityRow {
    /// Upper-case ticker, primary key.
    pub symbol: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Inactive symbols stay in the table but are not part of the run universe.
    pub is_active: bool,
    /// Row creation timestamp in RFC3339 UTC.
    pub created_at: String,
    /// Row update timestamp in RFC3339 UTC (maintained by trigger).
    pub updated_at: String,
}

/// Insertable form of [`EntityRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = entities)]
pub struct NewEntity<'a> {
    /// Upper-case ticker.
    pub symbol: &'a str,
    /// Optional display name.
    pub name: Option<&'a str>,
}

/// A row in [`crate::schema::entity_metrics`], exactly as stored.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = entity_metrics, primary_key(symbol), check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntityMetricsRow {
    /// Primary key.
    pub symbol: String,
    /// Company name from the last profile fetch.
    pub name: Option<String>,
    /// `YYYY-MM-DD`; NULL until the first successful refresh.
    pub last_updated_date: Option<String>,
    /// Current price.
    pub price: Option<String>,
    /// Change versus previous close.
    pub daily_change: Option<String>,
    /// Percent change versus previous close.
    pub daily_change_percent: Option<String>,
    /// Change versus the 30-day reference close.
    pub monthly_change: Option<String>,
    /// Percent change versus the 30-day reference close.
    pub monthly_change_percent: Option<String>,
    /// Change versus the 1-year reference close.
    pub yearly_change: Option<String>,
    /// Percent change versus the 1-year reference close.
    pub yearly_change_percent: Option<String>,
    /// Session open.
    pub open_price: Option<String>,
    /// Session high.
    pub high_price: Option<String>,
    /// Session low.
    pub low_price: Option<String>,
    /// Previous session close.
    pub previous_close: Option<String>,
    /// Market capitalization in currency units.
    pub market_cap: Option<i64>,
    /// Trailing P/E.
    pub pe_ratio: Option<String>,
    /// Price to book.
    pub price_to_book: Option<String>,
    /// Indicated annual dividend yield.
    pub dividend_yield: Option<String>,
    /// Industry classification.
    pub sector: Option<String>,
    /// RFC3339 UTC timestamp of the last successful write.
    pub updated_at: Option<String>,
}

/// Full-row write used by the record upsert. `None` writes NULL on update.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = entity_metrics, primary_key(symbol), treat_none_as_null = true)]
pub struct EntityMetricsWrite {
    /// Primary key; never part of the changeset.
    pub symbol: String,
    /// See [`EntityMetricsRow::name`].
    pub name: Option<String>,
    /// See [`EntityMetricsRow::last_updated_date`].
    pub last_updated_date: Option<String>,
    /// See [`EntityMetricsRow::price`].
    pub price: Option<String>,
    /// See [`EntityMetricsRow::daily_change`].
    pub daily_change: Option<String>,
    /// See [`EntityMetricsRow::daily_change_percent`].
    pub daily_change_percent: Option<String>,
    /// See [`EntityMetricsRow::monthly_change`].
    pub monthly_change: Option<String>,
    /// See [`EntityMetricsRow::monthly_change_percent`].
    pub monthly_change_percent: Option<String>,
    /// See [`EntityMetricsRow::yearly_change`].
    pub yearly_change: Option<String>,
    /// See [`EntityMetricsRow::yearly_change_percent`].
    pub yearly_change_percent: Option<String>,
    /// See [`EntityMetricsRow::open_price`].
    pub open_price: Option<String>,
    /// See [`EntityMetricsRow::high_price`].
    pub high_price: Option<String>,
    /// See [`EntityMetricsRow::low_price`].
    pub low_price: Option<String>,
    /// See [`EntityMetricsRow::previous_close`].
    pub previous_close: Option<String>,
    /// See [`EntityMetricsRow::market_cap`].
    pub market_cap: Option<i64>,
    /// See [`EntityMetricsRow::pe_ratio`].
    pub pe_ratio: Option<String>,
    /// See [`EntityMetricsRow::price_to_book`].
    pub price_to_book: Option<String>,
    /// See [`EntityMetricsRow::dividend_yield`].
    pub dividend_yield: Option<String>,
    /// See [`EntityMetricsRow::sector`].
    pub sector: Option<String>,
    /// See [`EntityMetricsRow::updated_at`].
    pub updated_at: Option<String>,
}

/// A row in [`crate::schema::worker_lease`].
#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Selectable)]
#[diesel(table_name = worker_lease, check_for_backend(diesel::sqlite::Sqlite))]
pub struct LeaseRow {
    /// Lease name, primary key.
    pub name: String,
    /// Opaque holder id.
    pub owner: String,
    /// RFC3339 UTC.
    pub acquired_at: String,
    /// RFC3339 UTC; the lease is free once this has passed.
    pub expires_at: String,
}
