//! Call pacing shared by every outbound request of one client.
//!
//! Three independent holds are applied, in this order, before a call may go out:
//! 1. a cooldown deadline, set after the provider reported a rate-limit violation;
//! 2. the rolling-window ceiling ([`CallWindow`]), the authoritative backstop;
//! 3. minimum spacing between consecutive calls (`governor`, burst of one), checked
//!    once more against the tokio clock since governor keeps its own.
//!
//! The window is checked before the spacing so that a long window wait cannot leave a
//! stale spacing permit behind. Calls are expected to be issued one at a time.

use std::{
    collections::VecDeque,
    num::NonZeroU32,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

/// Log of recent call instants, enforcing at most `limit` calls per `span`.
///
/// A call at `t` occupies the half-open window `[t, t + span)`.
#[derive(Debug)]
pub struct CallWindow {
    limit: usize,
    span: Duration,
    calls: VecDeque<Instant>,
}

impl CallWindow {
    pub fn new(limit: NonZeroU32, span: Duration) -> Self {
        let limit = limit.get() as usize;
        Self {
            limit,
            span,
            calls: VecDeque::with_capacity(limit),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.calls.front() {
            if now.saturating_duration_since(*oldest) >= self.span {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long a call at `now` would have to wait. Zero means it may go now.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        self.prune(now);
        if self.calls.len() < self.limit {
            return Duration::ZERO;
        }
        match self.calls.front() {
            Some(oldest) => self.span.saturating_sub(now.saturating_duration_since(*oldest)),
            None => Duration::ZERO,
        }
    }

    /// Records a call made at `now`.
    pub fn record(&mut self, now: Instant) {
        self.calls.push_back(now);
    }

    /// Calls currently counted against the window.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.calls.len()
    }
}

pub struct RateGate {
    spacing: Option<DefaultDirectRateLimiter>,
    min_gap: Duration,
    last_call: Mutex<Option<Instant>>,
    window: Mutex<CallWindow>,
    cooldown: Duration,
    cooldown_until: Mutex<Option<Instant>>,
}

impl RateGate {
    /// `spacing` of zero disables the spacing hold; the window ceiling always applies.
    pub fn new(spacing: Duration, limit: NonZeroU32, window: Duration, cooldown: Duration) -> Self {
        Self {
            spacing: Quota::with_period(spacing).map(RateLimiter::direct),
            min_gap: spacing,
            last_call: Mutex::new(None),
            window: Mutex::new(CallWindow::new(limit, window)),
            cooldown,
            cooldown_until: Mutex::new(None),
        }
    }

    /// Waits until one more outbound call is permitted and records it.
    pub async fn acquire(&self) {
        loop {
            let until = *self
                .cooldown_until
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match until {
                Some(deadline) if deadline > Instant::now() => sleep_until(deadline).await,
                _ => break,
            }
        }

        loop {
            let wait = self.window().wait_time(Instant::now());
            if wait.is_zero() {
                break;
            }
            debug!(wait_ms = wait.as_millis() as u64, "rate window full; delaying call");
            sleep(wait).await;
        }

        if let Some(limiter) = &self.spacing {
            limiter.until_ready().await;
            let last = *self.last_call.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(last) = last {
                sleep_until(last + self.min_gap).await;
            }
        }

        let now = Instant::now();
        *self.last_call.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
        self.window().record(now);
    }

    /// Blocks every further call for the configured cooldown (or the provider's
    /// `retry_after` hint when longer).
    pub fn start_cooldown(&self, retry_after: Option<Duration>) {
        let pause = retry_after.map_or(self.cooldown, |hint| hint.max(self.cooldown));
        let deadline = Instant::now() + pause;
        let mut until = self
            .cooldown_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if until.is_none_or(|current| current < deadline) {
            *until = Some(deadline);
        }
        warn!(cooldown_ms = pause.as_millis() as u64, "provider signalled rate limit; cooling down");
    }

    /// Calls counted against the rolling window right now.
    pub fn calls_in_window(&self) -> usize {
        self.window().in_window(Instant::now())
    }

    fn window(&self) -> std::sync::MutexGuard<'_, CallWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
