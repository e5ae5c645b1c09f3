//! Incremental metrics ingestion for a fixed universe of market entities.
//!
//! Each invocation of the worker is one bounded, rate-respecting pass: pick the
//! entities whose stored metrics are older than today's trading date, refresh a
//! batch of them through [`market_data_ingestor`]'s rate-bounded client, and
//! persist one atomic record per entity in SQLite.
//!
//! - [`universe`]: which entities are tracked
//! - [`freshness`]: which of them need a refresh today
//! - [`metrics`]: derived daily, monthly and yearly changes
//! - [`records`]: the persistence gateway
//! - [`worker`]: the batch orchestrator and its configuration
//! - [`lease`]: optional mutual exclusion between overlapping runs

pub mod db;
pub mod freshness;
pub mod lease;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod records;
pub mod schema;
pub mod tz;
pub mod universe;
pub mod worker;
