#![allow(dead_code)]

use std::{
    collections::HashMap,
    num::NonZeroU32,
    str::FromStr,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use diesel::{QueryableByName, prelude::*, sql_types::{BigInt, Integer, Text}};
use market_data_ingestor::{
    client::{ClientConfig, RateLimitedClient},
    models::{financials::BasicFinancials, profile::CompanyProfile, quote::Quote},
    providers::{ProviderError, QuoteProvider},
};
use metrics_sync::{
    db::{connection, migrate},
    records::{EntityMetricsRecord, MetricsRepo, SqliteRepo, StoreError, StoreResult},
    universe::{Entity, StaticUniverse},
    worker::{BatchWorker, RunConfig},
};
use rust_decimal::Decimal;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    n: i64,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("test.db").to_string_lossy().to_string();

    migrate::run_sqlite(&path).expect("migrations");
    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {table}"))
        .get_result::<Count>(conn)
        .unwrap()
        .n
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 2024-03-14 11:00 in New York.
pub fn market_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 15, 0, 0).unwrap()
}

pub fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("S{i:02}")).collect()
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    UnknownSymbol,
    Timeout,
    Unauthorized,
}

impl Failure {
    fn error(self, symbol: &str) -> ProviderError {
        match self {
            Failure::UnknownSymbol => ProviderError::UnknownSymbol(symbol.to_string()),
            Failure::Timeout => ProviderError::Timeout,
            Failure::Unauthorized => ProviderError::Unauthorized {
                status: 401,
                message: "Invalid API key".into(),
            },
        }
    }
}

/// In-memory provider: every symbol trades at 100 unless told otherwise.
#[derive(Default)]
pub struct FakeProvider {
    prices: Mutex<HashMap<String, Decimal>>,
    failures: Mutex<HashMap<String, Failure>>,
    fail_everything: Mutex<Option<Failure>>,
    quote_calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn set_price(&self, symbol: &str, price: &str) {
        self.prices.lock().unwrap().insert(symbol.to_string(), dec(price));
    }

    pub fn fail(&self, symbol: &str, failure: Failure) {
        self.failures.lock().unwrap().insert(symbol.to_string(), failure);
    }

    pub fn heal(&self, symbol: &str) {
        self.failures.lock().unwrap().remove(symbol);
    }

    pub fn fail_all(&self, failure: Failure) {
        *self.fail_everything.lock().unwrap() = Some(failure);
    }

    pub fn quote_calls(&self) -> Vec<String> {
        self.quote_calls.lock().unwrap().clone()
    }

    fn failure(&self, symbol: &str) -> Option<Failure> {
        let all = *self.fail_everything.lock().unwrap();
        all.or_else(|| self.failures.lock().unwrap().get(symbol).copied())
    }
}

#[async_trait]
impl QuoteProvider for FakeProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        self.quote_calls.lock().unwrap().push(symbol.to_string());
        if let Some(f) = self.failure(symbol) {
            return Err(f.error(symbol));
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or_else(|| dec("100"));
        Ok(Quote {
            current: price,
            previous_close: Some(price - Decimal::ONE),
            open: Some(price - Decimal::TWO),
            high: Some(price + Decimal::ONE),
            low: Some(price - Decimal::TWO),
            timestamp: None,
        })
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        Ok(CompanyProfile {
            name: Some(format!("{symbol} Corp")),
            exchange: Some("NASDAQ".into()),
            sector: Some("Technology".into()),
        })
    }

    async fn fetch_basic_financials(
        &self,
        _symbol: &str,
    ) -> Result<BasicFinancials, ProviderError> {
        Ok(BasicFinancials {
            market_cap: Some(2_500_000_000),
            pe_ratio: Some(dec("28.5")),
            price_to_book: None,
            dividend_yield: Some(dec("0.55")),
        })
    }
}

/// Unpaced client with a generous window so multi-run tests never wait on the ceiling.
pub fn test_client_config() -> ClientConfig {
    ClientConfig {
        spacing: Duration::ZERO,
        calls_per_window: NonZeroU32::new(10_000).unwrap(),
        window: Duration::from_secs(60),
        request_timeout: Duration::from_secs(5),
        retry_backoff: Duration::from_millis(10),
        rate_limit_cooldown: Duration::from_secs(1),
        include_financials: true,
    }
}

pub fn run_config(batch_size: usize) -> RunConfig {
    RunConfig {
        batch_size,
        ..RunConfig::default()
    }
}

pub fn static_universe(symbols: &[String]) -> StaticUniverse {
    StaticUniverse::new(symbols.iter().map(|s| Entity::new(s.as_str())))
}

pub fn worker<R: MetricsRepo>(
    repo: R,
    universe: StaticUniverse,
    config: RunConfig,
) -> BatchWorker<FakeProvider, R, StaticUniverse> {
    BatchWorker::new(
        RateLimitedClient::new(FakeProvider::default(), test_client_config()),
        repo,
        universe,
        config,
    )
}

/// Repo whose upserts fail on demand before delegating to SQLite.
#[derive(Default)]
pub struct FlakyRepo {
    pub inner: SqliteRepo,
    /// Upserts left to fail with a query error.
    pub query_failures: AtomicUsize,
    /// When set, every upsert reports the database unreachable.
    pub unavailable: Mutex<bool>,
    pub upserts: AtomicUsize,
}

impl MetricsRepo for FlakyRepo {
    fn ensure_records(&self, conn: &mut SqliteConnection, symbols: &[String]) -> StoreResult<usize> {
        self.inner.ensure_records(conn, symbols)
    }

    fn record_get(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
    ) -> StoreResult<Option<EntityMetricsRecord>> {
        self.inner.record_get(conn, symbol)
    }

    fn records_all(&self, conn: &mut SqliteConnection) -> StoreResult<Vec<EntityMetricsRecord>> {
        self.inner.records_all(conn)
    }

    fn close_on_or_before(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<Decimal>> {
        self.inner.close_on_or_before(conn, symbol, date)
    }

    fn record_upsert(
        &self,
        conn: &mut SqliteConnection,
        record: &EntityMetricsRecord,
    ) -> StoreResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if *self.unavailable.lock().unwrap() {
            return Err(StoreError::Unavailable("database is closed".into()));
        }
        let left = self.query_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.query_failures.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Query(diesel::result::Error::RollbackTransaction));
        }
        self.inner.record_upsert(conn, record)
    }
}

/// Repo that switches the connection to read-only once records are loaded, so
/// every later write fails inside SQLite itself.
#[derive(Default)]
pub struct ReadOnlyAfterLoad(pub SqliteRepo);

impl MetricsRepo for ReadOnlyAfterLoad {
    fn ensure_records(&self, conn: &mut SqliteConnection, symbols: &[String]) -> StoreResult<usize> {
        self.0.ensure_records(conn, symbols)
    }

    fn record_get(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
    ) -> StoreResult<Option<EntityMetricsRecord>> {
        self.0.record_get(conn, symbol)
    }

    fn records_all(&self, conn: &mut SqliteConnection) -> StoreResult<Vec<EntityMetricsRecord>> {
        let all = self.0.records_all(conn)?;
        diesel::sql_query("PRAGMA query_only = ON").execute(conn)?;
        Ok(all)
    }

    fn close_on_or_before(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<Decimal>> {
        self.0.close_on_or_before(conn, symbol, date)
    }

    fn record_upsert(
        &self,
        conn: &mut SqliteConnection,
        record: &EntityMetricsRecord,
    ) -> StoreResult<()> {
        self.0.record_upsert(conn, record)
    }
}
