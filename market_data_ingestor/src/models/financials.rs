use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Basic fundamentals reported alongside the quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicFinancials {
    /// Market capitalization in whole currency units.
    pub market_cap: Option<i64>,
    /// Price / earnings (basic, excluding extraordinary items, TTM).
    pub pe_ratio: Option<Decimal>,
    /// Price / book (annual).
    pub price_to_book: Option<Decimal>,
    /// Indicated annual dividend yield, in percent.
    pub dividend_yield: Option<Decimal>,
}
