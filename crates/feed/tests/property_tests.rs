//! Property tests for estimate merging.
//!
//! 1. Ordering: merged periods are unique and strictly increasing
//! 2. Priority: a reported value always comes from the first source that has one
//! 3. Idempotence: merging the result again with the same input changes nothing
//! 4. Horizon: a merged period is historical iff some source reported it

use feed::{EstimateMerger, EstimatePoint, EstimateSeries, Horizon, Metric, PeriodKey, PeriodKind, Symbol};
use proptest::prelude::*;

fn arb_key() -> impl Strategy<Value = PeriodKey> {
    (1970i32..2070, 1u8..=4).prop_map(|(year, q)| PeriodKey::quarterly(year, q).unwrap())
}

fn arb_value() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![Just(None), (-50.0..50.0_f64).prop_map(Some)]
}

fn arb_series(source: &'static str) -> impl Strategy<Value = EstimateSeries> {
    prop::collection::vec((arb_key(), arb_value(), arb_value()), 0..12).prop_map(move |rows| {
        EstimateSeries::new(Symbol::new("MU"), Metric::Eps, PeriodKind::Quarterly).with_points(
            rows.into_iter()
                .map(|(key, reported, estimate)| {
                    EstimatePoint::new(key.label(), PeriodKind::Quarterly, reported, estimate, source)
                })
                .collect(),
        )
    })
}

proptest! {
    #[test]
    fn periods_are_unique_and_sorted(a in arb_series("a"), b in arb_series("b")) {
        let merged = EstimateMerger::new().merge(&[a, b]).unwrap().series;
        let keys: Vec<PeriodKey> = merged.iter().map(|p| p.key().unwrap()).collect();
        prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn reported_follows_priority(a in arb_series("a"), b in arb_series("b")) {
        let merged = EstimateMerger::new().merge(&[a.clone(), b.clone()]).unwrap().series;
        for point in merged.iter() {
            let key = point.key().unwrap();
            let first = a
                .iter()
                .chain(b.iter())
                .filter(|p| p.key().unwrap() == key)
                .find_map(|p| p.reported);
            prop_assert_eq!(point.reported, first);
        }
    }

    #[test]
    fn merge_is_idempotent(a in arb_series("a"), b in arb_series("b")) {
        let merger = EstimateMerger::new();
        let once = merger.merge(&[a, b.clone()]).unwrap().series;
        let twice = merger.merge(&[once.clone(), b]).unwrap().series;
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn historical_iff_reported(a in arb_series("a"), b in arb_series("b")) {
        let merged = EstimateMerger::new().merge(&[a, b]).unwrap().series;
        for point in merged.iter() {
            prop_assert_eq!(point.horizon == Horizon::Historical, point.reported.is_some());
        }
    }
}
