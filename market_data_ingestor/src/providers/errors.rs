use std::time::Duration;

use thiserror::Error;

/// Errors that can occur within a `QuoteProvider` implementation.
///
/// Every variant is classified as retryable or not via [`ProviderError::is_retryable`];
/// the client retries only the former.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced a response (connection refused, reset, DNS).
    #[error("API request failed: {0}")]
    Transport(String),

    /// No response within the per-request timeout.
    #[error("API request timed out")]
    Timeout,

    /// The provider rejected the call because its rate budget is exhausted.
    #[error("API rate limit reached (retry after {retry_after:?})")]
    RateLimited {
        /// Provider hint from the `Retry-After` header, if any.
        retry_after: Option<Duration>,
    },

    /// The provider failed internally (HTTP 5xx).
    #[error("API server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Credentials were rejected (HTTP 401). Affects every symbol.
    #[error("API rejected credentials ({status}): {message}")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The provider does not know this symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// The provider's API returned a specific error message (other 4xx).
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The payload could not be decoded into the expected shape.
    #[error("malformed API payload: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Maps a non-success HTTP status to an error variant.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => ProviderError::RateLimited { retry_after },
            401 => ProviderError::Unauthorized { status, message },
            500..=599 => ProviderError::Server { status, message },
            _ => ProviderError::Api { status, message },
        }
    }

    /// True for failures that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_)
                | ProviderError::Timeout
                | ProviderError::RateLimited { .. }
                | ProviderError::Server { .. }
        )
    }

    /// True when the failure concerns the whole account rather than one symbol.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::from_status(status.as_u16(), err.to_string(), None)
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status(429, String::new(), Some(Duration::from_secs(3))),
            ProviderError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(3)
        ));
        assert!(ProviderError::from_status(401, "bad key".into(), None).is_unauthorized());
        // 403 is per-endpoint (plan does not include it), not a bad key.
        assert!(matches!(
            ProviderError::from_status(403, "no access".into(), None),
            ProviderError::Api { status: 403, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(502, "bad gateway".into(), None),
            ProviderError::Server { status: 502, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(422, "nope".into(), None),
            ProviderError::Api { status: 422, .. }
        ));
    }

    #[test]
    fn retryability() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::from_status(503, String::new(), None).is_retryable());

        assert!(!ProviderError::UnknownSymbol("ZZZZ".into()).is_retryable());
        assert!(!ProviderError::Decode("eof".into()).is_retryable());
        assert!(!ProviderError::from_status(401, String::new(), None).is_retryable());
        assert!(!ProviderError::from_status(400, String::new(), None).is_retryable());
    }
}
