use chrono::NaiveDate;
use diesel::{prelude::*, upsert::excluded};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::{
    models::{EntityMetricsRow, EntityMetricsWrite},
    records::{EntityMetricsRecord, MetricsRepo, StoreError, StoreResult},
    schema::{entity_metrics, price_history},
    tz,
};

use crate::schema::entity_metrics::dsl as em;
use crate::schema::price_history::dsl as ph;

/// [`MetricsRepo`] over the SQLite tables `entity_metrics` and `price_history`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteRepo;

impl SqliteRepo {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsRepo for SqliteRepo {
    fn ensure_records(
        &self,
        conn: &mut SqliteConnection,
        symbols: &[String],
    ) -> StoreResult<usize> {
        if symbols.is_empty() {
            return Ok(0);
        }
        let rows: Vec<_> = symbols.iter().map(|s| em::symbol.eq(s)).collect();
        let created = diesel::insert_or_ignore_into(entity_metrics::table)
            .values(&rows)
            .execute(conn)?;
        Ok(created)
    }

    fn record_get(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
    ) -> StoreResult<Option<EntityMetricsRecord>> {
        em::entity_metrics
            .filter(em::symbol.eq(symbol))
            .select(EntityMetricsRow::as_select())
            .first(conn)
            .optional()?
            .map(EntityMetricsRecord::try_from)
            .transpose()
    }

    fn records_all(&self, conn: &mut SqliteConnection) -> StoreResult<Vec<EntityMetricsRecord>> {
        em::entity_metrics
            .order(em::symbol.asc())
            .select(EntityMetricsRow::as_select())
            .load(conn)?
            .into_iter()
            .map(EntityMetricsRecord::try_from)
            .collect()
    }

    fn close_on_or_before(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<Decimal>> {
        let close: Option<String> = ph::price_history
            .filter(ph::symbol.eq(symbol))
            .filter(ph::trade_date.le(tz::date_to_text(date)))
            .order(ph::trade_date.desc())
            .select(ph::close)
            .first(conn)
            .optional()?;

        close
            .map(|s| {
                Decimal::from_str(&s).map_err(|_| StoreError::Corrupt {
                    symbol: symbol.to_string(),
                    column: "close",
                    value: s,
                })
            })
            .transpose()
    }

    fn record_upsert(
        &self,
        conn: &mut SqliteConnection,
        record: &EntityMetricsRecord,
    ) -> StoreResult<()> {
        let incomplete = |field| StoreError::Incomplete {
            symbol: record.symbol.clone(),
            field,
        };
        let as_of = record.last_updated_date.ok_or_else(|| incomplete("last_updated_date"))?;
        let price = record.price.ok_or_else(|| incomplete("price"))?;

        let row = EntityMetricsWrite::from(record);
        let day = tz::date_to_text(as_of);
        let close = price.normalize().to_string();

        // BEGIN IMMEDIATE: the date check and both writes see one snapshot.
        conn.immediate_transaction::<_, StoreError, _>(|conn| {
            let stored: Option<Option<String>> = em::entity_metrics
                .filter(em::symbol.eq(&record.symbol))
                .select(em::last_updated_date)
                .first(conn)
                .optional()?;

            if let Some(stored) = stored.flatten() {
                let stored = tz::parse_date(&stored).map_err(|_| StoreError::Corrupt {
                    symbol: record.symbol.clone(),
                    column: "last_updated_date",
                    value: stored.clone(),
                })?;
                if stored > as_of {
                    return Err(StoreError::Regression {
                        symbol: record.symbol.clone(),
                        stored,
                        attempted: as_of,
                    });
                }
            }

            diesel::insert_into(entity_metrics::table)
                .values(&row)
                .on_conflict(em::symbol)
                .do_update()
                .set(&row)
                .execute(conn)?;

            diesel::insert_into(price_history::table)
                .values((
                    ph::symbol.eq(&record.symbol),
                    ph::trade_date.eq(&day),
                    ph::close.eq(&close),
                ))
                .on_conflict((ph::symbol, ph::trade_date))
                .do_update()
                .set(ph::close.eq(excluded(ph::close)))
                .execute(conn)?;

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connection, migrate};

    fn conn() -> (tempfile::TempDir, SqliteConnection) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.db").to_string_lossy().to_string();
        migrate::run_sqlite(&path).unwrap();
        (dir, connection::connect_sqlite(&path).unwrap())
    }

    #[test]
    fn ensure_records_is_idempotent() {
        let (_dir, mut conn) = conn();
        let repo = SqliteRepo::new();
        let syms = vec!["MSFT".to_string(), "AAPL".to_string()];

        assert_eq!(repo.ensure_records(&mut conn, &syms).unwrap(), 2);
        assert_eq!(repo.ensure_records(&mut conn, &syms).unwrap(), 0);

        let all = repo.records_all(&mut conn).unwrap();
        assert_eq!(all, vec![EntityMetricsRecord::empty("AAPL"), EntityMetricsRecord::empty("MSFT")]);
    }

    #[test]
    fn upsert_requires_date_and_price() {
        let (_dir, mut conn) = conn();
        let err = SqliteRepo
            .record_upsert(&mut conn, &EntityMetricsRecord::empty("AAPL"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Incomplete { field: "last_updated_date", .. }));
    }
}
