//! Layered run configuration.
//!
//! Precedence, lowest first: built-in defaults, the optional TOML settings file,
//! then command-line [`Overrides`]. Secrets never live here; the API key and
//! database location come from the environment.
//!
//! ```toml
//! [worker]
//! batch_size = 10
//! delay_seconds = 1.0
//! max_entities = 0        # 0 = unlimited
//! market_timezone = "America/New_York"
//!
//! [provider]
//! calls_per_minute = 60
//! rate_limit_cooldown_secs = 60
//! ```

use std::{num::NonZeroU32, path::Path, time::Duration};

use chrono_tz::Tz;
use market_data_ingestor::{
    client::{ClientConfig, config::PROVIDER_WINDOW},
    providers::finnhub::DEFAULT_BASE_URL,
};
use serde::{Deserialize, Serialize};

use crate::tz::{DEFAULT_MARKET_TZ, parse_tz};

/// One week.
pub const MAX_LEASE_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Settings file contents. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    pub worker: WorkerSettings,
    pub provider: ProviderSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkerSettings {
    /// Entities refreshed per run. Must be positive.
    pub batch_size: usize,
    /// Minimum spacing between provider calls, seconds.
    pub delay_seconds: f64,
    /// Upper bound on entities per run; 0 means unlimited.
    pub max_entities: usize,
    /// Refresh even entities already refreshed today.
    pub force: bool,
    /// IANA zone whose calendar date is the trading date.
    pub market_timezone: String,
    /// Take the run lease before working.
    pub lease: bool,
    pub lease_ttl_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay_seconds: 1.0,
            max_entities: 0,
            force: false,
            market_timezone: DEFAULT_MARKET_TZ.to_string(),
            lease: true,
            lease_ttl_secs: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProviderSettings {
    pub base_url: String,
    /// Provider's published ceiling per rolling minute.
    pub calls_per_minute: u32,
    pub request_timeout_secs: u64,
    pub retry_backoff_ms: u64,
    /// Pause after the provider answers 429 without a usable Retry-After.
    pub rate_limit_cooldown_secs: u64,
    pub include_financials: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            calls_per_minute: 60,
            request_timeout_secs: 10,
            retry_backoff_ms: 2000,
            rate_limit_cooldown_secs: 60,
            include_financials: true,
        }
    }
}

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub batch_size: Option<usize>,
    pub delay_seconds: Option<f64>,
    pub max_entities: Option<usize>,
    pub force: Option<bool>,
    pub no_lease: bool,
}

/// Validated worker-side configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub batch_size: usize,
    /// 0 = unlimited.
    pub max_entities: usize,
    pub force: bool,
    /// Restrict the run to these symbols (already normalized). Empty = whole universe.
    pub symbols: Vec<String>,
    pub market_tz: Tz,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_entities: 0,
            force: false,
            symbols: Vec::new(),
            market_tz: chrono_tz::America::New_York,
        }
    }
}

impl RunConfig {
    /// Entities one run may process: `min(batch_size, max_entities)` with 0 meaning no cap.
    pub fn run_limit(&self) -> usize {
        match self.max_entities {
            0 => self.batch_size,
            cap => self.batch_size.min(cap),
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn apply(&mut self, o: &Overrides) {
        if let Some(v) = o.batch_size {
            self.worker.batch_size = v;
        }
        if let Some(v) = o.delay_seconds {
            self.worker.delay_seconds = v;
        }
        if let Some(v) = o.max_entities {
            self.worker.max_entities = v;
        }
        if let Some(v) = o.force {
            self.worker.force = v;
        }
        if o.no_lease {
            self.worker.lease = false;
        }
    }

    /// Checks every constraint the run relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.worker;
        let p = &self.provider;
        if w.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than 0"));
        }
        if !w.delay_seconds.is_finite() || w.delay_seconds < 0.0 {
            return Err(invalid(
                "delay_seconds",
                format!("must be a finite number >= 0, got {}", w.delay_seconds),
            ));
        }
        parse_tz(&w.market_timezone)
            .map_err(|_| invalid("market_timezone", format!("unknown zone {:?}", w.market_timezone)))?;
        if w.lease && !(1..=MAX_LEASE_TTL_SECS).contains(&w.lease_ttl_secs) {
            return Err(invalid(
                "lease_ttl_secs",
                format!("must be between 1 and {MAX_LEASE_TTL_SECS}"),
            ));
        }
        if p.calls_per_minute == 0 {
            return Err(invalid("calls_per_minute", "must be greater than 0"));
        }
        if p.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than 0"));
        }
        if !(p.base_url.starts_with("http://") || p.base_url.starts_with("https://")) {
            return Err(invalid("base_url", format!("not an http(s) URL: {}", p.base_url)));
        }
        Ok(())
    }

    pub fn run_config(&self, symbols: Vec<String>) -> Result<RunConfig, ConfigError> {
        self.validate()?;
        let market_tz = parse_tz(&self.worker.market_timezone)
            .map_err(|e| invalid("market_timezone", e.to_string()))?;
        Ok(RunConfig {
            batch_size: self.worker.batch_size,
            max_entities: self.worker.max_entities,
            force: self.worker.force,
            symbols,
            market_tz,
        })
    }

    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        self.validate()?;
        let p = &self.provider;
        let spacing = Duration::try_from_secs_f64(self.worker.delay_seconds)
            .map_err(|e| invalid("delay_seconds", e.to_string()))?;
        let calls_per_window = NonZeroU32::new(p.calls_per_minute)
            .ok_or_else(|| invalid("calls_per_minute", "must be greater than 0"))?;
        Ok(ClientConfig {
            spacing,
            calls_per_window,
            window: PROVIDER_WINDOW,
            request_timeout: Duration::from_secs(p.request_timeout_secs),
            retry_backoff: Duration::from_millis(p.retry_backoff_ms),
            rate_limit_cooldown: Duration::from_secs(p.rate_limit_cooldown_secs),
            include_financials: p.include_financials,
        })
    }

    pub fn lease_ttl(&self) -> chrono::Duration {
        let secs = self.worker.lease_ttl_secs.min(MAX_LEASE_TTL_SECS);
        chrono::Duration::seconds(secs as i64)
    }
}
