//! Trading-calendar dates and timestamp text helpers.
//!
//! - [`trading_date`]: the calendar date of an instant in the market's time zone. This
//!   is the `as_of` date freshness is judged against.
//! - [`parse_tz`]: parse an IANA zone name (e.g. "America/New_York").
//! - [`to_rfc3339_millis`] / [`to_rfc3339_nanos`] / [`parse_ts_to_utc`]: the timestamp
//!   text forms used in SQLite.
//! - [`date_to_text`] / [`parse_date`]: the `YYYY-MM-DD` date form used in SQLite.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Default market calendar zone for US equities.
pub const DEFAULT_MARKET_TZ: &str = "America/New_York";

/// Parse an IANA time zone name.
pub fn parse_tz(name: &str) -> anyhow::Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("bad tz: {name}"))
}

/// Calendar date of `now` in `tz`.
///
/// 2024-03-15T02:00Z is still 2024-03-14 in New York.
pub fn trading_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Parse an RFC3339 timestamp (any offset) and convert to UTC.
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad RFC3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Format a UTC datetime as an RFC3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Format a UTC datetime as an RFC3339 string keeping every nanosecond.
pub fn to_rfc3339_nanos(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

/// `YYYY-MM-DD`; sorts lexically in date order.
pub fn date_to_text(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("bad date: {s}"))
}
