//! Freshness tracking: which entities need a refresh for a trading date.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{records::EntityMetricsRecord, universe::Entity};

/// True if `force` is set, the record was never refreshed, or it was last
/// refreshed before `as_of`.
pub fn needs_refresh(record: &EntityMetricsRecord, as_of: NaiveDate, force: bool) -> bool {
    force || is_stale(record.last_updated_date, as_of)
}

fn is_stale(last_updated: Option<NaiveDate>, as_of: NaiveDate) -> bool {
    last_updated.is_none_or(|d| d < as_of)
}

/// Filters `universe` down to the entities needing refresh, keeping universe order.
///
/// An entity without a record counts as never refreshed.
pub fn select_stale<'a>(
    universe: &'a [Entity],
    records: &HashMap<String, EntityMetricsRecord>,
    as_of: NaiveDate,
    force: bool,
) -> Vec<&'a Entity> {
    universe
        .iter()
        .filter(|e| match records.get(&e.symbol) {
            Some(r) => needs_refresh(r, as_of, force),
            None => true,
        })
        .collect()
}

/// Fresh/stale breakdown of a universe for one trading date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FreshnessReport {
    pub as_of: Option<NaiveDate>,
    pub total: usize,
    pub fresh: usize,
    pub stale: usize,
    pub never_refreshed: usize,
}

pub fn report(
    universe: &[Entity],
    records: &HashMap<String, EntityMetricsRecord>,
    as_of: NaiveDate,
) -> FreshnessReport {
    let mut out = FreshnessReport {
        as_of: Some(as_of),
        total: universe.len(),
        ..FreshnessReport::default()
    };
    for e in universe {
        let last = records.get(&e.symbol).and_then(|r| r.last_updated_date);
        if last.is_none() {
            out.never_refreshed += 1;
        }
        if is_stale(last, as_of) {
            out.stale += 1;
        } else {
            out.fresh += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(n as u64)
    }

    fn record(last: Option<NaiveDate>) -> EntityMetricsRecord {
        EntityMetricsRecord {
            last_updated_date: last,
            ..EntityMetricsRecord::empty("AAPL")
        }
    }

    #[test]
    fn refreshed_today_is_fresh_unless_forced() {
        let today = day(10);
        assert!(!needs_refresh(&record(Some(today)), today, false));
        assert!(needs_refresh(&record(Some(today)), today, true));
        assert!(needs_refresh(&record(Some(day(9))), today, false));
    }

    #[test]
    fn selection_keeps_universe_order() {
        let universe = vec![Entity::new("A"), Entity::new("B"), Entity::new("C"), Entity::new("D")];
        let mut records = HashMap::new();
        records.insert("A".to_string(), EntityMetricsRecord { last_updated_date: Some(day(5)), ..EntityMetricsRecord::empty("A") });
        records.insert("C".to_string(), EntityMetricsRecord { last_updated_date: Some(day(4)), ..EntityMetricsRecord::empty("C") });

        let picked: Vec<&str> = select_stale(&universe, &records, day(5), false)
            .into_iter()
            .map(|e| e.symbol.as_str())
            .collect();
        assert_eq!(picked, vec!["B", "C", "D"]);

        let r = report(&universe, &records, day(5));
        assert_eq!((r.total, r.fresh, r.stale, r.never_refreshed), (4, 1, 3, 2));
    }

    proptest! {
        #[test]
        fn refreshed_on_as_of_or_later_is_excluded(offset in 0i64..400, ahead in 0i64..3) {
            let as_of = day(offset);
            let last = day(offset + ahead);
            prop_assert!(!needs_refresh(&record(Some(last)), as_of, false));
        }

        #[test]
        fn never_refreshed_is_always_included(offset in 0i64..400, force in any::<bool>()) {
            prop_assert!(needs_refresh(&record(None), day(offset), force));
        }

        #[test]
        fn older_refresh_is_included(offset in 1i64..400, back in 1i64..400) {
            let as_of = day(offset + back);
            prop_assert!(needs_refresh(&record(Some(day(offset))), as_of, false));
        }
    }
}
