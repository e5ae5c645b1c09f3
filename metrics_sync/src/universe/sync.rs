//! Universe synchronization.
//!
//! Computes a [`UniverseDiff`] between the normalized universe file (desired) and the
//! `entities` table (current), then applies it inside one `BEGIN IMMEDIATE`
//! transaction so the table moves from one consistent universe to the next.
//!
//! Rows are never deleted. Symbols missing from the file are deactivated only with
//! [`SyncOptions::deactivate_missing`]. Every added symbol also gets its null metrics
//! record. With [`SyncOptions::dry_run`] the diff is returned and nothing is written.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use diesel::prelude::*;
use tracing::info;

use crate::{
    models::{EntityRow, NewEntity},
    records::{MetricsRepo, SqliteRepo},
    schema::entities::{self, dsl as en},
    universe::config::{UniverseFile, normalize_universe},
};

/// Options for universe synchronization.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOptions {
    /// Compute and return the diff without writing.
    pub dry_run: bool,
    /// Mark active symbols absent from the file as inactive.
    pub deactivate_missing: bool,
}

/// What needs to change to make the table match the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniverseDiff {
    /// New symbols -> name.
    pub added: BTreeMap<String, Option<String>>,
    /// Existing symbols whose name changed -> new name.
    pub renamed: BTreeMap<String, Option<String>>,
    /// Inactive symbols listed again in the file.
    pub reactivated: BTreeSet<String>,
    /// Active symbols missing from the file (only with `deactivate_missing`).
    pub deactivated: BTreeSet<String>,
}

impl UniverseDiff {
    /// True if there is nothing to write.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.renamed.is_empty()
            && self.reactivated.is_empty()
            && self.deactivated.is_empty()
    }
}

impl fmt::Display for UniverseDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            return writeln!(f, "universe up to date");
        }
        for (sym, name) in &self.added {
            writeln!(f, "+ {sym}  \"{}\"", name.as_deref().unwrap_or(""))?;
        }
        for (sym, name) in &self.renamed {
            writeln!(f, "~ {sym}  \"{}\"", name.as_deref().unwrap_or(""))?;
        }
        for sym in &self.reactivated {
            writeln!(f, "^ {sym}")?;
        }
        for sym in &self.deactivated {
            writeln!(f, "- {sym}")?;
        }
        Ok(())
    }
}

fn compute_diff(file: &UniverseFile, current: &[EntityRow], opt: SyncOptions) -> UniverseDiff {
    let have: BTreeMap<&str, &EntityRow> = current.iter().map(|r| (r.symbol.as_str(), r)).collect();
    let want: BTreeSet<&str> = file.entities.iter().map(|e| e.symbol.as_str()).collect();

    let mut diff = UniverseDiff::default();
    for e in &file.entities {
        match have.get(e.symbol.as_str()) {
            None => {
                diff.added.insert(e.symbol.clone(), e.name.clone());
            }
            Some(row) => {
                if row.name != e.name {
                    diff.renamed.insert(e.symbol.clone(), e.name.clone());
                }
                if !row.is_active {
                    diff.reactivated.insert(e.symbol.clone());
                }
            }
        }
    }

    if opt.deactivate_missing {
        diff.deactivated = current
            .iter()
            .filter(|r| r.is_active && !want.contains(r.symbol.as_str()))
            .map(|r| r.symbol.clone())
            .collect();
    }
    diff
}

fn apply_diff(conn: &mut SqliteConnection, diff: &UniverseDiff) -> anyhow::Result<()> {
    let new_rows: Vec<NewEntity<'_>> = diff
        .added
        .iter()
        .map(|(symbol, name)| NewEntity {
            symbol,
            name: name.as_deref(),
        })
        .collect();
    if !new_rows.is_empty() {
        diesel::insert_into(entities::table)
            .values(&new_rows)
            .execute(conn)?;
    }

    for (sym, name) in &diff.renamed {
        diesel::update(en::entities.filter(en::symbol.eq(sym)))
            .set(en::name.eq(name))
            .execute(conn)?;
    }
    if !diff.reactivated.is_empty() {
        diesel::update(en::entities.filter(en::symbol.eq_any(&diff.reactivated)))
            .set(en::is_active.eq(true))
            .execute(conn)?;
    }
    if !diff.deactivated.is_empty() {
        diesel::update(en::entities.filter(en::symbol.eq_any(&diff.deactivated)))
            .set(en::is_active.eq(false))
            .execute(conn)?;
    }

    let added: Vec<String> = diff.added.keys().cloned().collect();
    SqliteRepo.ensure_records(conn, &added)?;
    Ok(())
}

/// Sync the universe file into SQLite and return what changed (or would change).
pub fn sync_universe(
    conn: &mut SqliteConnection,
    mut file: UniverseFile,
    opt: SyncOptions,
) -> anyhow::Result<UniverseDiff> {
    let report = normalize_universe(&mut file)?;
    if report.duplicates_dropped > 0 {
        info!(dropped = report.duplicates_dropped, "dropped duplicate universe entries");
    }

    let diff = conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
        let current: Vec<EntityRow> = en::entities
            .select(EntityRow::as_select())
            .order(en::symbol.asc())
            .load(conn)?;
        let diff = compute_diff(&file, &current, opt);
        if !opt.dry_run {
            apply_diff(conn, &diff)?;
        }
        Ok(diff)
    })?;

    info!(
        dry_run = opt.dry_run,
        added = diff.added.len(),
        renamed = diff.renamed.len(),
        reactivated = diff.reactivated.len(),
        deactivated = diff.deactivated.len(),
        "universe sync"
    );
    Ok(diff)
}
