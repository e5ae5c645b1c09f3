use std::{num::NonZeroU32, time::Duration};

use nonzero_ext::nonzero;

/// Length of the provider's rolling rate window.
pub const PROVIDER_WINDOW: Duration = Duration::from_secs(60);

/// Pacing, timeout, and retry knobs for [`RateLimitedClient`](super::RateLimitedClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Minimum gap between two consecutive outbound calls. Zero disables spacing.
    pub spacing: Duration,
    /// Hard ceiling of calls inside any rolling `window`.
    pub calls_per_window: NonZeroU32,
    /// Rolling window the ceiling applies to.
    pub window: Duration,
    /// Upper bound on one outbound call.
    pub request_timeout: Duration,
    /// Pause before the single retry of a transient failure.
    pub retry_backoff: Duration,
    /// Minimum pause for all calls after the provider signals a rate-limit violation.
    pub rate_limit_cooldown: Duration,
    /// Whether to fetch basic fundamentals after quote and profile.
    pub include_financials: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            spacing: Duration::from_secs(1),
            calls_per_window: nonzero!(60u32),
            window: PROVIDER_WINDOW,
            request_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(2),
            rate_limit_cooldown: Duration::from_secs(60),
            include_financials: true,
        }
    }
}
