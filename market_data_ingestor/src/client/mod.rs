//! Rate-bounded fetch client.
//!
//! [`RateLimitedClient::fetch`] gathers everything one refresh needs for a symbol
//! (quote, profile, and optionally fundamentals). Every outbound call, retries
//! included, first passes through the shared [`RateGate`]; each call is bounded by
//! the request timeout; transient failures are retried exactly once after a backoff.
//! Nothing is cached.

pub mod config;
pub mod gate;

use std::future::Future;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::{
    errors::FetchError,
    models::entity_data::RawEntityData,
    providers::{Endpoint, ProviderError, QuoteProvider},
};

pub use config::ClientConfig;
pub use gate::RateGate;

/// Outbound calls per operation: the first attempt plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

pub struct RateLimitedClient<P> {
    provider: P,
    gate: RateGate,
    config: ClientConfig,
}

impl<P: QuoteProvider> RateLimitedClient<P> {
    pub fn new(provider: P, config: ClientConfig) -> Self {
        let gate = RateGate::new(
            config.spacing,
            config.calls_per_window,
            config.window,
            config.rate_limit_cooldown,
        );
        Self {
            provider,
            gate,
            config,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetches quote, profile, and (when enabled) fundamentals for `symbol`.
    ///
    /// Quote and profile failures fail the fetch. Fundamentals are best effort: apart
    /// from a credential rejection, a failure there is logged and leaves `financials`
    /// empty.
    pub async fn fetch(&self, symbol: &str) -> Result<RawEntityData, FetchError> {
        let quote = self
            .call(symbol, Endpoint::Quote, || self.provider.fetch_quote(symbol))
            .await?;
        let profile = self
            .call(symbol, Endpoint::Profile, || self.provider.fetch_profile(symbol))
            .await?;

        let financials = if self.config.include_financials {
            match self
                .call(symbol, Endpoint::Financials, || {
                    self.provider.fetch_basic_financials(symbol)
                })
                .await
            {
                Ok(f) => Some(f),
                Err(e) if e.is_unauthorized() => return Err(e),
                Err(e) => {
                    warn!(symbol, error = %e, "fundamentals unavailable; continuing without them");
                    None
                }
            }
        } else {
            None
        };

        Ok(RawEntityData {
            symbol: symbol.to_string(),
            quote,
            profile,
            financials,
        })
    }

    async fn call<T, F, Fut>(&self, symbol: &str, endpoint: Endpoint, op: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            self.gate.acquire().await;
            debug!(symbol, %endpoint, attempt, "calling provider");

            let outcome = match timeout(self.config.request_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if let ProviderError::RateLimited { retry_after } = &err {
                self.gate.start_cooldown(*retry_after);
            }

            if err.is_retryable() && attempt < MAX_ATTEMPTS {
                let backoff = self.config.retry_backoff;
                warn!(
                    symbol,
                    %endpoint,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "provider call failed; retrying"
                );
                sleep(backoff).await;
                attempt += 1;
                continue;
            }

            return Err(FetchError {
                symbol: symbol.to_string(),
                endpoint,
                attempts: attempt,
                source: err,
            });
        }
    }
}
