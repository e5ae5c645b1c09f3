//! Finnhub REST provider (`/quote`, `/stock/profile2`, `/stock/metric`).

pub mod provider;
pub mod response;

pub use provider::{API_KEY_ENV, DEFAULT_BASE_URL, FinnhubProvider};
