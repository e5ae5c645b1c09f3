//! Everything fetched for one entity in a single refresh cycle.

use serde::{Deserialize, Serialize};

use crate::models::{financials::BasicFinancials, profile::CompanyProfile, quote::Quote};

/// Raw provider data for one symbol, as handed to metrics computation.
///
/// `financials` is `None` when fundamentals were disabled or could not be
/// fetched; quote and profile are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntityData {
    /// Symbol the data was fetched for.
    pub symbol: String,
    /// Real-time quote.
    pub quote: Quote,
    /// Company profile (sector lives here).
    pub profile: CompanyProfile,
    /// Best-effort fundamentals.
    pub financials: Option<BasicFinancials>,
}
