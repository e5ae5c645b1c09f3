//! Wire shapes of the Finnhub endpoints and their conversion into the
//! provider-agnostic models.
//!
//! Finnhub answers unknown symbols with HTTP 200 and an all-zero quote or an
//! empty object, so the conversions are where unknown symbols are detected.

use chrono::{DateTime, Utc};
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

use crate::models::{financials::BasicFinancials, profile::CompanyProfile, quote::Quote};
use crate::providers::ProviderError;

#[derive(Deserialize, Debug)]
pub struct FinnhubQuote {
    #[serde(rename = "c")]
    pub current: Option<f64>,
    #[serde(rename = "d")]
    pub change: Option<f64>,
    #[serde(rename = "dp")]
    pub change_percent: Option<f64>,
    #[serde(rename = "h")]
    pub high: Option<f64>,
    #[serde(rename = "l")]
    pub low: Option<f64>,
    #[serde(rename = "o")]
    pub open: Option<f64>,
    #[serde(rename = "pc")]
    pub previous_close: Option<f64>,
    #[serde(rename = "t")]
    pub timestamp: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FinnhubProfile {
    pub name: Option<String>,
    pub ticker: Option<String>,
    pub exchange: Option<String>,
    #[serde(rename = "finnhubIndustry")]
    pub industry: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FinnhubMetricResponse {
    #[serde(default)]
    pub metric: FinnhubMetric,
}

#[derive(Deserialize, Debug, Default)]
pub struct FinnhubMetric {
    /// Millions of currency units.
    #[serde(rename = "marketCapitalization")]
    pub market_capitalization: Option<f64>,
    #[serde(rename = "peBasicExclExtraTTM")]
    pub pe_basic_excl_extra_ttm: Option<f64>,
    #[serde(rename = "pbAnnual")]
    pub pb_annual: Option<f64>,
    #[serde(rename = "dividendYieldIndicatedAnnual")]
    pub dividend_yield_indicated_annual: Option<f64>,
}

// Goes through the shortest round-trip text form so 261.74 stays 261.74.
fn decimal(v: Option<f64>) -> Option<Decimal> {
    v.filter(|f| f.is_finite())
        .and_then(|f| Decimal::from_str(&f.to_string()).ok())
}

// Finnhub reports "not available" as 0 for these fields.
fn nonzero(v: Option<f64>) -> Option<Decimal> {
    decimal(v).filter(|d| !d.is_zero())
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl FinnhubQuote {
    /// Converts the wire quote, detecting the all-zero "unknown symbol" answer.
    pub fn into_quote(self, symbol: &str) -> Result<Quote, ProviderError> {
        let current = decimal(self.current).ok_or_else(|| {
            ProviderError::Decode(format!("quote for {symbol} has no current price"))
        })?;
        let previous_close = decimal(self.previous_close);

        if current.is_zero() && previous_close.is_none_or(|pc| pc.is_zero()) {
            return Err(ProviderError::UnknownSymbol(symbol.to_string()));
        }

        let timestamp = self
            .timestamp
            .filter(|t| *t > 0)
            .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0));

        Ok(Quote {
            current,
            previous_close,
            open: nonzero(self.open),
            high: nonzero(self.high),
            low: nonzero(self.low),
            timestamp,
        })
    }
}

impl From<FinnhubProfile> for CompanyProfile {
    fn from(p: FinnhubProfile) -> Self {
        CompanyProfile {
            name: non_blank(p.name),
            exchange: non_blank(p.exchange),
            sector: non_blank(p.industry),
        }
    }
}

impl From<FinnhubMetricResponse> for BasicFinancials {
    fn from(r: FinnhubMetricResponse) -> Self {
        let m = r.metric;
        let market_cap = nonzero(m.market_capitalization)
            .and_then(|millions| (millions * Decimal::from(1_000_000)).round().to_i64());

        BasicFinancials {
            market_cap,
            pe_ratio: nonzero(m.pe_basic_excl_extra_ttm),
            price_to_book: nonzero(m.pb_annual),
            dividend_yield: nonzero(m.dividend_yield_indicated_annual),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_live_quote_shape() {
        let body = r#"{"c":261.74,"d":0.41,"dp":0.1569,"h":263.31,"l":260.68,"o":261.07,"pc":261.33,"t":1602705600}"#;
        let wire: FinnhubQuote = serde_json::from_str(body).unwrap();
        let quote = wire.into_quote("AAPL").unwrap();

        assert_eq!(quote.current, dec("261.74"));
        assert_eq!(quote.previous_close, Some(dec("261.33")));
        assert_eq!(quote.high, Some(dec("263.31")));
        assert_eq!(quote.timestamp.unwrap().timestamp(), 1_602_705_600);
    }

    #[test]
    fn all_zero_quote_is_unknown_symbol() {
        let body = r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#;
        let wire: FinnhubQuote = serde_json::from_str(body).unwrap();
        let err = wire.into_quote("NOPE").unwrap_err();
        assert!(matches!(err, ProviderError::UnknownSymbol(s) if s == "NOPE"));
    }

    #[test]
    fn quote_without_price_is_malformed() {
        let wire: FinnhubQuote = serde_json::from_str("{}").unwrap();
        assert!(matches!(wire.into_quote("AAPL"), Err(ProviderError::Decode(_))));
    }

    #[test]
    fn empty_profile_has_no_sector() {
        let wire: FinnhubProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(CompanyProfile::from(wire), CompanyProfile::default());

        let wire: FinnhubProfile = serde_json::from_str(
            r#"{"name":"Apple Inc","exchange":"NASDAQ NMS - GLOBAL MARKET","finnhubIndustry":"Technology","ticker":"AAPL","logo":"x"}"#,
        )
        .unwrap();
        let profile = CompanyProfile::from(wire);
        assert_eq!(profile.sector.as_deref(), Some("Technology"));
        assert_eq!(profile.name.as_deref(), Some("Apple Inc"));
    }

    #[test]
    fn metric_converts_market_cap_from_millions() {
        let body = r#"{"metric":{"marketCapitalization":2500.5,"peBasicExclExtraTTM":28.4,"pbAnnual":0,"dividendYieldIndicatedAnnual":null},"metricType":"all","symbol":"AAPL"}"#;
        let wire: FinnhubMetricResponse = serde_json::from_str(body).unwrap();
        let fin = BasicFinancials::from(wire);

        assert_eq!(fin.market_cap, Some(2_500_500_000));
        assert_eq!(fin.pe_ratio, Some(dec("28.4")));
        assert_eq!(fin.price_to_book, None);
        assert_eq!(fin.dividend_yield, None);
    }
}
