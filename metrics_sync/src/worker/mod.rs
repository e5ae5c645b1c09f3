//! Batch orchestrator.
//!
//! One [`BatchWorker::run`] is one bounded pass over the universe:
//!
//! 1. list the universe (stable symbol order) and make sure every symbol has a record;
//! 2. keep the entities that need refresh for today's trading date;
//! 3. truncate to [`RunConfig::run_limit`];
//! 4. for each entity, strictly in order: fetch through the rate-bounded client,
//!    compute metrics, upsert the record atomically.
//!
//! A failing entity is logged and recorded in the [`RunSummary`]; the batch goes on.
//! The run fails as a whole when the provider rejects our credentials or the
//! database stops taking writes. It also fails when nothing succeeded and every
//! attempted entity failed either transiently at the provider or at the store.

pub mod config;
pub mod summary;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::SqliteConnection;
use market_data_ingestor::{
    client::RateLimitedClient, errors::FetchError, models::entity_data::RawEntityData,
    providers::QuoteProvider,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    freshness,
    lease::{self, Lease},
    metrics::{self, DerivedMetrics, History, MetricsError},
    records::{EntityMetricsRecord, MetricsRepo, StoreError},
    tz,
    universe::{Entity, UniverseProvider},
};

pub use config::{Overrides, RunConfig, Settings};
pub use summary::{FailedEntity, RunSummary};

/// Failures that prevent a run from starting.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("entity universe unavailable: {0}")]
    Universe(#[source] StoreError),
    #[error("loading metrics records: {0}")]
    Records(#[source] StoreError),
}

/// Why one entity failed.
#[derive(thiserror::Error, Debug)]
pub enum EntityError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EntityError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EntityError::Fetch(e) if e.is_transient())
    }

    /// Reason to abort the whole run, if this failure means no other entity can succeed.
    pub fn systemic_reason(&self) -> Option<String> {
        match self {
            EntityError::Fetch(e) if e.is_unauthorized() => {
                Some(format!("provider rejected credentials: {}", e.source))
            }
            EntityError::Store(e) if e.is_unavailable() => Some(e.to_string()),
            _ => None,
        }
    }
}

pub struct BatchWorker<P, R, U> {
    client: RateLimitedClient<P>,
    repo: R,
    universe: U,
    config: RunConfig,
    stop: Arc<AtomicBool>,
    lease: Option<(Lease, Duration)>,
}

impl<P, R, U> BatchWorker<P, R, U>
where
    P: QuoteProvider,
    R: MetricsRepo,
    U: UniverseProvider,
{
    pub fn new(client: RateLimitedClient<P>, repo: R, universe: U, config: RunConfig) -> Self {
        Self {
            client,
            repo,
            universe,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            lease: None,
        }
    }

    /// Renew `lease` for `ttl` before each entity; losing it ends the run early.
    pub fn with_lease(mut self, lease: Lease, ttl: Duration) -> Self {
        self.lease = Some((lease, ttl));
        self
    }

    /// Setting the flag stops the run before its next entity.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn client(&self) -> &RateLimitedClient<P> {
        &self.client
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(&self, conn: &mut SqliteConnection) -> Result<RunSummary, WorkerError> {
        self.run_at(conn, Utc::now()).await
    }

    /// One bounded pass as of `now`.
    pub async fn run_at(
        &self,
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, WorkerError> {
        let started = Instant::now();
        let as_of = tz::trading_date(now, self.config.market_tz);
        let mut summary = RunSummary::new(as_of);

        let entities = self.restrict(
            self.universe
                .list_entities(conn)
                .map_err(WorkerError::Universe)?,
        );
        summary.universe = entities.len();

        let symbols: Vec<String> = entities.iter().map(|e| e.symbol.clone()).collect();
        let created = self
            .repo
            .ensure_records(conn, &symbols)
            .map_err(WorkerError::Records)?;
        let records: HashMap<String, EntityMetricsRecord> = self
            .repo
            .records_all(conn)
            .map_err(WorkerError::Records)?
            .into_iter()
            .map(|r| (r.symbol.clone(), r))
            .collect();

        let stale = freshness::select_stale(&entities, &records, as_of, self.config.force);
        summary.stale = stale.len();
        let selected: Vec<&Entity> = stale.into_iter().take(self.config.run_limit()).collect();
        summary.selected = selected.len();

        info!(
            %as_of,
            universe = summary.universe,
            new_records = created,
            stale = summary.stale,
            selected = summary.selected,
            force = self.config.force,
            "starting run"
        );

        let mut store_failures = 0usize;
        for entity in selected {
            if self.stop.load(Ordering::SeqCst) {
                warn!(remaining = summary.selected - summary.attempted, "stop requested; ending run early");
                summary.interrupted = true;
                break;
            }
            if !self.keep_lease(conn, now, started) {
                summary.interrupted = true;
                break;
            }

            summary.attempted += 1;
            match self.refresh(conn, entity, as_of, now).await {
                Ok(record) => {
                    summary.succeeded += 1;
                    info!(
                        symbol = %entity.symbol,
                        price = ?record.price,
                        daily_change_percent = ?record.daily_change_percent,
                        "refreshed"
                    );
                }
                Err(e) => {
                    error!(symbol = %entity.symbol, error = %e, "refresh failed");
                    if matches!(e, EntityError::Store(_)) {
                        store_failures += 1;
                    }
                    summary.failed.push(FailedEntity {
                        symbol: entity.symbol.clone(),
                        cause: e.to_string(),
                        transient: e.is_transient(),
                    });
                    if let Some(reason) = e.systemic_reason() {
                        error!(%reason, "aborting run");
                        summary.systemic_failure = Some(reason);
                        break;
                    }
                }
            }
        }

        let nothing_succeeded = summary.attempted > 0 && summary.succeeded == 0;
        if summary.systemic_failure.is_none() && nothing_succeeded {
            if store_failures == summary.failed.len() {
                summary.systemic_failure = Some(format!(
                    "persistence rejected writes: all {} attempted entities failed to store",
                    summary.attempted
                ));
            } else if summary.failed.iter().all(|f| f.transient) {
                summary.systemic_failure = Some(format!(
                    "provider unreachable: all {} attempted entities failed transiently",
                    summary.attempted
                ));
            }
        }

        info!(%summary, "run complete");
        Ok(summary)
    }

    /// False once another owner holds the lease.
    fn keep_lease(&self, conn: &mut SqliteConnection, now: DateTime<Utc>, started: Instant) -> bool {
        let Some((held, ttl)) = &self.lease else {
            return true;
        };
        let elapsed = Duration::from_std(started.elapsed()).unwrap_or(Duration::zero());
        match lease::renew(conn, held, *ttl, now + elapsed) {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!(lease = %held.name, owner = %held.owner, "run lease lost; ending run early");
                false
            }
            Err(e) => {
                warn!(lease = %held.name, error = %e, "renewing run lease failed");
                true
            }
        }
    }

    fn restrict(&self, mut entities: Vec<Entity>) -> Vec<Entity> {
        if self.config.symbols.is_empty() {
            return entities;
        }
        let wanted: HashSet<&str> = self.config.symbols.iter().map(String::as_str).collect();
        entities.retain(|e| wanted.contains(e.symbol.as_str()));
        for sym in &self.config.symbols {
            if !entities.iter().any(|e| &e.symbol == sym) {
                warn!(symbol = %sym, "requested symbol is not in the active universe; skipping");
            }
        }
        entities
    }

    async fn refresh(
        &self,
        conn: &mut SqliteConnection,
        entity: &Entity,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<EntityMetricsRecord, EntityError> {
        let raw = self.client.fetch(&entity.symbol).await?;

        let (month_ref, year_ref) = metrics::reference_dates(as_of);
        let history = History {
            prev_close: raw.quote.previous_close,
            price_30d_ago: self.repo.close_on_or_before(conn, &entity.symbol, month_ref)?,
            price_1y_ago: self.repo.close_on_or_before(conn, &entity.symbol, year_ref)?,
        };
        let derived = metrics::compute(&raw, &history)?;

        let record = build_record(entity, &raw, derived, as_of, now);
        self.persist(conn, &record)?;
        Ok(record)
    }

    fn persist(
        &self,
        conn: &mut SqliteConnection,
        record: &EntityMetricsRecord,
    ) -> Result<(), StoreError> {
        match self.repo.record_upsert(conn, record) {
            Err(e) if e.is_retryable() => {
                warn!(symbol = %record.symbol, error = %e, "persisting record failed; retrying once");
                self.repo.record_upsert(conn, record)
            }
            other => other,
        }
    }
}

fn build_record(
    entity: &Entity,
    raw: &RawEntityData,
    m: DerivedMetrics,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> EntityMetricsRecord {
    let fin = raw.financials.clone().unwrap_or_default();
    debug!(symbol = %entity.symbol, has_financials = raw.financials.is_some(), "building record");

    EntityMetricsRecord {
        symbol: entity.symbol.clone(),
        name: raw.profile.name.clone().or_else(|| entity.name.clone()),
        last_updated_date: Some(as_of),
        price: Some(m.price),
        daily_change: m.daily_change,
        daily_change_percent: m.daily_change_percent,
        monthly_change: m.monthly_change,
        monthly_change_percent: m.monthly_change_percent,
        yearly_change: m.yearly_change,
        yearly_change_percent: m.yearly_change_percent,
        open_price: raw.quote.open,
        high_price: raw.quote.high,
        low_price: raw.quote.low,
        previous_close: raw.quote.previous_close,
        market_cap: fin.market_cap,
        pe_ratio: fin.pe_ratio,
        price_to_book: fin.price_to_book,
        dividend_yield: fin.dividend_yield,
        sector: m.sector,
        updated_at: Some(now),
    }
}
