//! Provider abstraction for market data sources.
//!
//! This module defines the [`QuoteProvider`] trait, which serves as a unified interface
//! for fetching quotes, company profiles, and basic fundamentals from any market data
//! vendor (e.g., Finnhub).
//!
//! Implementations perform exactly one outbound call per method and classify every
//! failure into a [`ProviderError`]; pacing, retries, and timeouts belong to
//! [`RateLimitedClient`](crate::client::RateLimitedClient).
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_data_ingestor::models::{
//!     financials::BasicFinancials, profile::CompanyProfile, quote::Quote,
//! };
//! use market_data_ingestor::providers::{ProviderError, QuoteProvider};
//!
//! struct NoCoverage;
//!
//! #[async_trait]
//! impl QuoteProvider for NoCoverage {
//!     async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
//!         Err(ProviderError::UnknownSymbol(symbol.to_string()))
//!     }
//!     async fn fetch_profile(&self, _symbol: &str) -> Result<CompanyProfile, ProviderError> {
//!         Ok(CompanyProfile::default())
//!     }
//!     async fn fetch_basic_financials(&self, _symbol: &str) -> Result<BasicFinancials, ProviderError> {
//!         Ok(BasicFinancials::default())
//!     }
//! }
//! ```

pub mod errors;
pub mod finnhub;

use std::fmt;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use thiserror::Error;

use crate::models::{financials::BasicFinancials, profile::CompanyProfile, quote::Quote};

pub use errors::ProviderError;

/// Trait for fetching per-symbol market data from a provider.
///
/// The trait is object safe and `Send + Sync` so one instance can be shared by the
/// client and, if needed, selected at runtime as a `Box<dyn QuoteProvider>`.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Fetches the latest quote for `symbol`.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderError>;

    /// Fetches the company profile (name, exchange, sector) for `symbol`.
    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError>;

    /// Fetches basic fundamentals for `symbol`.
    async fn fetch_basic_financials(&self, symbol: &str)
    -> Result<BasicFinancials, ProviderError>;
}

#[async_trait]
impl<T: QuoteProvider + ?Sized> QuoteProvider for Box<T> {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        (**self).fetch_quote(symbol).await
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        (**self).fetch_profile(symbol).await
    }

    async fn fetch_basic_financials(
        &self,
        symbol: &str,
    ) -> Result<BasicFinancials, ProviderError> {
        (**self).fetch_basic_financials(symbol).await
    }
}

/// The provider operation a call targeted; used in logs and fetch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Real-time quote.
    Quote,
    /// Company profile.
    Profile,
    /// Basic fundamentals.
    Financials,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::Quote => "quote",
            Endpoint::Profile => "profile",
            Endpoint::Financials => "financials",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during the creation of a provider instance.
#[derive(Debug, Error)]
pub enum ProviderInitError {
    /// missed environment variable.
    #[error(transparent)]
    MissingEnvVar(#[from] MissingEnvVarError),

    /// The configured key is a known placeholder rather than a real credential.
    #[error("API key in {0} is a placeholder; configure a real key")]
    PlaceholderKey(String),

    /// failed to init reqwest client
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    /// API key contains invalid characters.
    #[error("Invalid API key format: {0}")]
    InvalidApiKey(#[from] reqwest::header::InvalidHeaderValue),
}
