use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use shared_utils::env::get_env_var;
use tracing::debug;

use crate::{
    models::{financials::BasicFinancials, profile::CompanyProfile, quote::Quote},
    providers::{
        ProviderError, ProviderInitError, QuoteProvider,
        finnhub::response::{FinnhubMetricResponse, FinnhubProfile, FinnhubQuote},
    },
};

/// Public Finnhub REST root.
pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Environment variable holding the Finnhub API key.
pub const API_KEY_ENV: &str = "FINNHUB_API_KEY";

const TOKEN_HEADER: &str = "X-Finnhub-Token";

// Finnhub's documentation uses this value in examples; it is never a usable key.
const PLACEHOLDER_KEY: &str = "demo";

pub struct FinnhubProvider {
    client: Client,
    base_url: String,
}

impl FinnhubProvider {
    /// Creates a provider that authenticates every request with `api_key`.
    ///
    /// `timeout` bounds each HTTP request end to end.
    pub fn new(
        api_key: SecretString,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderInitError> {
        let mut token = header::HeaderValue::from_str(api_key.expose_secret())?;
        token.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates a new Finnhub provider.
    ///
    /// Reads the API key from the `FINNHUB_API_KEY` environment variable and
    /// rejects the documentation placeholder key.
    pub fn from_env(base_url: &str, timeout: Duration) -> Result<Self, ProviderInitError> {
        let api_key = get_env_var(API_KEY_ENV)?;
        if api_key == PLACEHOLDER_KEY {
            return Err(ProviderInitError::PlaceholderKey(API_KEY_ENV.to_string()));
        }
        Self::new(SecretString::new(api_key.into()), base_url, timeout)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            debug!(path, status = status.as_u16(), "finnhub request rejected");
            return Err(ProviderError::from_status(
                status.as_u16(),
                message,
                retry_after,
            ));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::Decode(format!("{path}: {e}")))
    }
}

#[async_trait]
impl QuoteProvider for FinnhubProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let wire: FinnhubQuote = self.get_json("quote", &[("symbol", symbol)]).await?;
        wire.into_quote(symbol)
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        let wire: FinnhubProfile = self
            .get_json("stock/profile2", &[("symbol", symbol)])
            .await?;
        Ok(wire.into())
    }

    async fn fetch_basic_financials(
        &self,
        symbol: &str,
    ) -> Result<BasicFinancials, ProviderError> {
        let wire: FinnhubMetricResponse = self
            .get_json("stock/metric", &[("symbol", symbol), ("metric", "all")])
            .await?;
        Ok(wire.into())
    }
}
