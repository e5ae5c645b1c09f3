use thiserror::Error;

use crate::providers::{Endpoint, ProviderError};

/// A rate-bounded fetch for one symbol failed after the client's bounded retries.
#[derive(Debug, Error)]
#[error("{endpoint} fetch for {symbol} failed after {attempts} attempt(s): {source}")]
pub struct FetchError {
    /// Symbol being fetched.
    pub symbol: String,
    /// Provider operation that failed.
    pub endpoint: Endpoint,
    /// Number of outbound calls made for this operation.
    pub attempts: u32,
    /// Classified provider failure from the last attempt.
    #[source]
    pub source: ProviderError,
}

impl FetchError {
    /// True when the last failure was transient (network, timeout, 5xx, 429).
    pub fn is_transient(&self) -> bool {
        self.source.is_retryable()
    }

    /// True when the provider rejected our credentials; no other symbol can succeed.
    pub fn is_unauthorized(&self) -> bool {
        self.source.is_unauthorized()
    }
}
