//! Run lease: keeps overlapping invocations from working the same universe.
//!
//! A single row per lease name in `worker_lease` records the holder and an expiry.
//! Acquisition happens inside `BEGIN IMMEDIATE`, so two processes racing for a
//! free lease are serialized by SQLite's write lock. An expired lease may be taken
//! over; a crashed holder therefore blocks runs for at most one TTL. A running
//! holder renews before each entity so long batches keep it.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use tracing::{debug, info};

use crate::{
    models::LeaseRow,
    records::{StoreError, StoreResult},
    schema::worker_lease::{self, dsl as wl},
    tz,
};

/// Lease name used by `metrics-sync run`.
pub const RUN_LEASE: &str = "metrics-sync/run";

/// A held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub name: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    Acquired(Lease),
    /// Another live holder has it.
    Held { owner: String, expires_at: DateTime<Utc> },
}

/// Holder id for this process.
pub fn process_owner(now: DateTime<Utc>) -> String {
    format!("pid-{}-{}", std::process::id(), now.timestamp_millis())
}

fn parse_expiry(name: &str, s: &str) -> StoreResult<DateTime<Utc>> {
    tz::parse_ts_to_utc(s).map_err(|_| StoreError::Corrupt {
        symbol: name.to_string(),
        column: "expires_at",
        value: s.to_string(),
    })
}

/// Takes `name` for `owner` until `now + ttl` unless another owner holds it unexpired.
///
/// Re-acquiring a lease already held by `owner` extends it.
pub fn try_acquire(
    conn: &mut SqliteConnection,
    name: &str,
    owner: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> StoreResult<LeaseOutcome> {
    conn.immediate_transaction::<_, StoreError, _>(|conn| {
        let current: Option<LeaseRow> = wl::worker_lease
            .filter(wl::name.eq(name))
            .select(LeaseRow::as_select())
            .first(conn)
            .optional()?;

        if let Some(row) = current {
            let expires_at = parse_expiry(name, &row.expires_at)?;
            if row.owner != owner && expires_at > now {
                debug!(lease = name, holder = %row.owner, "lease held");
                return Ok(LeaseOutcome::Held {
                    owner: row.owner,
                    expires_at,
                });
            }
            if row.owner != owner {
                info!(lease = name, previous = %row.owner, "taking over expired lease");
            }
        }

        let expires_at = now + ttl;
        let row = LeaseRow {
            name: name.to_string(),
            owner: owner.to_string(),
            acquired_at: tz::to_rfc3339_nanos(now),
            expires_at: tz::to_rfc3339_nanos(expires_at),
        };
        diesel::insert_into(worker_lease::table)
            .values(&row)
            .on_conflict(wl::name)
            .do_update()
            .set(&row)
            .execute(conn)?;

        Ok(LeaseOutcome::Acquired(Lease {
            name: row.name,
            owner: row.owner,
            expires_at,
        }))
    })
}

/// Pushes the expiry of a lease `lease.owner` still holds to `now + ttl`.
///
/// Returns `None` when the lease has been released or taken over since.
pub fn renew(
    conn: &mut SqliteConnection,
    lease: &Lease,
    ttl: Duration,
    now: DateTime<Utc>,
) -> StoreResult<Option<Lease>> {
    let expires_at = now + ttl;
    let updated = diesel::update(
        wl::worker_lease.filter(wl::name.eq(&lease.name).and(wl::owner.eq(&lease.owner))),
    )
    .set(wl::expires_at.eq(tz::to_rfc3339_nanos(expires_at)))
    .execute(conn)?;

    Ok((updated == 1).then(|| Lease {
        expires_at,
        ..lease.clone()
    }))
}

/// Drops the lease if `lease.owner` still holds it. Returns whether a row was removed.
pub fn release(conn: &mut SqliteConnection, lease: &Lease) -> StoreResult<bool> {
    let removed = diesel::delete(
        wl::worker_lease.filter(wl::name.eq(&lease.name).and(wl::owner.eq(&lease.owner))),
    )
    .execute(conn)?;
    Ok(removed == 1)
}
