//! Derived metrics for one refresh.
//!
//! [`compute`] is pure: given the fetched data and the reference prices it
//! returns absolute and percentage changes over a day, ~30 days and ~1 year,
//! plus the pass-through sector. A missing or zero reference yields nulls for
//! that pair instead of failing the whole computation.

use chrono::{Days, NaiveDate};
use market_data_ingestor::models::entity_data::RawEntityData;
use rust_decimal::Decimal;
use serde::Serialize;

/// Decimal places kept on percentages.
pub const PERCENT_DP: u32 = 4;

/// Calendar-day look-back for the monthly reference close.
pub const MONTH_LOOKBACK_DAYS: u64 = 30;

/// Calendar-day look-back for the yearly reference close.
pub const YEAR_LOOKBACK_DAYS: u64 = 365;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MetricsError {
    #[error("{symbol}: non-positive current price {price}")]
    NonPositivePrice { symbol: String, price: Decimal },
    #[error("{symbol}: arithmetic overflow computing {field}")]
    Overflow { symbol: String, field: &'static str },
}

/// Reference prices the changes are measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct History {
    pub prev_close: Option<Decimal>,
    pub price_30d_ago: Option<Decimal>,
    pub price_1y_ago: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub price: Decimal,
    pub daily_change: Option<Decimal>,
    pub daily_change_percent: Option<Decimal>,
    pub monthly_change: Option<Decimal>,
    pub monthly_change_percent: Option<Decimal>,
    pub yearly_change: Option<Decimal>,
    pub yearly_change_percent: Option<Decimal>,
    pub sector: Option<String>,
}

/// Dates whose closes serve as the monthly and yearly references.
pub fn reference_dates(as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
    let back = |days| as_of.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
    (back(MONTH_LOOKBACK_DAYS), back(YEAR_LOOKBACK_DAYS))
}

/// `(current - reference) / reference * 100`, rounded to [`PERCENT_DP`].
///
/// `None` when the reference is zero or the result does not fit.
pub fn percent_change(current: Decimal, reference: Decimal) -> Option<Decimal> {
    if reference.is_zero() {
        return None;
    }
    current
        .checked_sub(reference)?
        .checked_div(reference)?
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|p| p.round_dp(PERCENT_DP))
}

type Change = (Option<Decimal>, Option<Decimal>);

fn change(
    symbol: &str,
    field: &'static str,
    current: Decimal,
    reference: Option<Decimal>,
) -> Result<Change, MetricsError> {
    let Some(reference) = reference else {
        return Ok((None, None));
    };
    let abs = current
        .checked_sub(reference)
        .ok_or_else(|| MetricsError::Overflow {
            symbol: symbol.to_string(),
            field,
        })?;
    Ok((Some(abs), percent_change(current, reference)))
}

/// Derives the stored metrics from one fetch.
pub fn compute(raw: &RawEntityData, history: &History) -> Result<DerivedMetrics, MetricsError> {
    let price = raw.quote.current;
    if price <= Decimal::ZERO {
        return Err(MetricsError::NonPositivePrice {
            symbol: raw.symbol.clone(),
            price,
        });
    }

    let (daily_change, daily_change_percent) =
        change(&raw.symbol, "daily_change", price, history.prev_close)?;
    let (monthly_change, monthly_change_percent) =
        change(&raw.symbol, "monthly_change", price, history.price_30d_ago)?;
    let (yearly_change, yearly_change_percent) =
        change(&raw.symbol, "yearly_change", price, history.price_1y_ago)?;

    Ok(DerivedMetrics {
        price,
        daily_change,
        daily_change_percent,
        monthly_change,
        monthly_change_percent,
        yearly_change,
        yearly_change_percent,
        sector: raw.profile.sector.clone(),
    })
}
