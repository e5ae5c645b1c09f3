use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::atomic::Ordering,
};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use market_data_ingestor::{
    client::RateLimitedClient,
    providers::{ProviderInitError, finnhub::FinnhubProvider},
};
use metrics_sync::{
    db::{DATABASE_URL_ENV, connection, migrate},
    freshness,
    lease::{self, LeaseOutcome, RUN_LEASE},
    logging,
    records::{MetricsRepo, SqliteRepo},
    tz,
    universe::{
        StoredUniverse, UniverseProvider,
        config::load_universe_path,
        normalize_symbol,
        sync::{SyncOptions, sync_universe},
    },
    worker::{BatchWorker, Overrides, Settings, config::ConfigError},
};
use shared_utils::env::{MissingEnvVarError, get_env_var};
use tracing::{error, info, warn};

const EXIT_SYSTEMIC: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(version, about = "Rate-bounded market metrics sync")]
struct Cli {
    /// TOML settings file with [worker] and [provider] tables.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// SQLite database; overrides DATABASE_URL.
    #[arg(long, global = true, value_name = "URL")]
    database_url: Option<String>,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Refresh one batch of stale entities.
    Run(RunArgs),
    /// Manage the tracked universe.
    Universe(UniverseCmd),
    /// Show fresh/stale counts for today's trading date.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Apply pending database migrations.
    Migrate,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    batch_size: Option<usize>,
    /// Seconds between provider calls.
    #[arg(long, value_name = "SECONDS")]
    delay: Option<f64>,
    /// Cap on entities this run; 0 = unlimited.
    #[arg(long)]
    max_entities: Option<usize>,
    /// Refresh even entities already refreshed today.
    #[arg(long, conflicts_with = "no_force")]
    force: bool,
    /// Skip entities already refreshed today, even if the settings file forces.
    #[arg(long)]
    no_force: bool,
    /// Only consider these symbols (repeatable).
    #[arg(long = "symbol", value_name = "SYMBOL")]
    symbols: Vec<String>,
    /// Do not take the run lease.
    #[arg(long)]
    no_lease: bool,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct UniverseCmd {
    #[command(subcommand)]
    sub: UniverseSub,
}

#[derive(Subcommand)]
enum UniverseSub {
    Sync {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        deactivate_missing: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("metrics-sync failed: {e:#}");
            if is_config_error(&e) {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::from(EXIT_SYSTEMIC)
            }
        }
    }
}

fn is_config_error(e: &anyhow::Error) -> bool {
    e.chain().any(|c| {
        c.is::<ConfigError>() || c.is::<ProviderInitError>() || c.is::<MissingEnvVarError>()
    })
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let settings = load_settings(cli.config.as_deref())?;
    let db_url = database_url(cli.database_url)?;

    match cli.cmd {
        Cmd::Run(args) => run(settings, &db_url, args).await,
        Cmd::Universe(UniverseCmd {
            sub:
                UniverseSub::Sync {
                    file,
                    dry_run,
                    deactivate_missing,
                },
        }) => {
            let universe = load_universe_path(&file)?;
            let mut conn = connection::open_migrated(&db_url)?;
            let diff = sync_universe(
                &mut conn,
                universe,
                SyncOptions {
                    dry_run,
                    deactivate_missing,
                },
            )?;
            print!("{diff}");
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Status { json } => status(settings, &db_url, json),
        Cmd::Migrate => {
            let applied = migrate::run_sqlite(&db_url)?;
            println!("applied {applied} migration(s)");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(p) => Settings::load_path(p),
        None => Ok(Settings::default()),
    }
}

fn database_url(flag: Option<String>) -> Result<String, MissingEnvVarError> {
    match flag {
        Some(url) => Ok(url),
        None => get_env_var(DATABASE_URL_ENV),
    }
}

async fn run(mut settings: Settings, db_url: &str, args: RunArgs) -> Result<ExitCode> {
    settings.apply(&Overrides {
        batch_size: args.batch_size,
        delay_seconds: args.delay,
        max_entities: args.max_entities,
        force: match (args.force, args.no_force) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        no_lease: args.no_lease,
    });

    let symbols = args
        .symbols
        .iter()
        .map(|s| {
            normalize_symbol(s).ok_or_else(|| ConfigError::Invalid {
                field: "symbol",
                reason: format!("invalid symbol {s:?}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let run_config = settings.run_config(symbols)?;
    let client_config = settings.client_config()?;

    let provider =
        FinnhubProvider::from_env(&settings.provider.base_url, client_config.request_timeout)?;

    let mut conn = connection::open_migrated(db_url)?;

    let held = if settings.worker.lease {
        let now = Utc::now();
        let owner = lease::process_owner(now);
        match lease::try_acquire(&mut conn, RUN_LEASE, &owner, settings.lease_ttl(), now)
            .context("acquiring run lease")?
        {
            LeaseOutcome::Acquired(l) => Some(l),
            LeaseOutcome::Held { owner, expires_at } => {
                info!(holder = %owner, %expires_at, "another run holds the lease; skipping this run");
                return Ok(ExitCode::SUCCESS);
            }
        }
    } else {
        None
    };

    let mut worker = BatchWorker::new(
        RateLimitedClient::new(provider, client_config),
        SqliteRepo::new(),
        StoredUniverse,
        run_config,
    );
    if let Some(l) = &held {
        worker = worker.with_lease(l.clone(), settings.lease_ttl());
    }

    let stop = worker.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current entity");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let outcome = worker.run(&mut conn).await;

    if let Some(l) = &held {
        if let Err(e) = lease::release(&mut conn, l) {
            warn!(error = %e, "releasing run lease failed; it expires at {}", l.expires_at);
        }
    }

    let summary = outcome?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }

    Ok(if summary.is_systemic_failure() {
        ExitCode::from(EXIT_SYSTEMIC)
    } else {
        ExitCode::SUCCESS
    })
}

fn status(settings: Settings, db_url: &str, json: bool) -> Result<ExitCode> {
    let run_config = settings.run_config(Vec::new())?;
    let mut conn = connection::open_migrated(db_url)?;

    let universe = StoredUniverse.list_entities(&mut conn)?;
    let records: HashMap<_, _> = SqliteRepo
        .records_all(&mut conn)?
        .into_iter()
        .map(|r| (r.symbol.clone(), r))
        .collect();
    let as_of = tz::trading_date(Utc::now(), run_config.market_tz);
    let report = freshness::report(&universe, &records, as_of);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "as_of={as_of} total={} fresh={} stale={} never_refreshed={}",
            report.total, report.fresh, report.stale, report.never_refreshed
        );
    }
    Ok(ExitCode::SUCCESS)
}
