//! Weighted mode over opaque values.

use indexmap::IndexMap;
use tally_types::{AggregateReporter, MicroReport};

use super::{AggregationOutcome, AggregationStrategy};
use crate::{OracleError, Result};

/// Selects the value carrying the most total power.
///
/// Ties go to the value seen first in submission order. Within the winning
/// value the strongest report is selected, again first on ties.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedMode;

impl AggregationStrategy for WeightedMode {
    fn name(&self) -> &'static str {
        "weighted-mode"
    }

    fn aggregate(&self, reports: &[MicroReport]) -> Result<AggregationOutcome> {
        if reports.is_empty() {
            return Err(OracleError::NoReportsToAggregate);
        }

        let mut weights: IndexMap<&str, u64> = IndexMap::new();
        let mut total_power = 0u64;
        for r in reports {
            total_power = total_power.checked_add(r.power).ok_or(OracleError::Overflow)?;
            let w = weights.entry(r.value.as_str()).or_insert(0);
            *w = w.checked_add(r.power).ok_or(OracleError::Overflow)?;
        }

        let mut winner: Option<(&str, u64)> = None;
        for (value, weight) in &weights {
            if winner.map_or(true, |(_, best)| *weight > best) {
                winner = Some((value, *weight));
            }
        }
        let (value, _) = winner.ok_or(OracleError::NoReportsToAggregate)?;

        let mut report_index = 0;
        let mut best_power = None;
        for (i, r) in reports.iter().enumerate() {
            if r.value == value && best_power.map_or(true, |p| r.power > p) {
                report_index = i;
                best_power = Some(r.power);
            }
        }
        let selected = &reports[report_index];

        Ok(AggregationOutcome {
            report_index,
            value: selected.value.clone(),
            reporter: selected.reporter.clone(),
            reporter_power: selected.power,
            total_power,
            std_dev: 0.0,
            reporters: reports
                .iter()
                .map(|r| AggregateReporter {
                    reporter: r.reporter.clone(),
                    power: r.power,
                    block_number: r.block_number,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::report;
    use proptest::prelude::*;

    #[test]
    fn test_mode_picks_heaviest_value() {
        let reports = vec![
            report(1, "aaa", 10),
            report(2, "aaa", 4),
            report(3, "aaa", 2),
            report(4, "aaa", 20),
            report(5, "bbb", 8),
        ];
        let out = WeightedMode.aggregate(&reports).expect("aggregate");
        assert_eq!(out.value, "aaa");
        assert_eq!(out.report_index, 3);
        assert_eq!(out.reporter_power, 20);
        assert_eq!(out.total_power, 44);
    }

    #[test]
    fn test_mode_first_strongest_reporter_wins() {
        let reports = vec![
            report(1, "ccc", 1),
            report(2, "ccc", 2),
            report(3, "ccc", 2),
            report(4, "ccc", 1),
            report(5, "ddd", 5),
        ];
        let out = WeightedMode.aggregate(&reports).expect("aggregate");
        assert_eq!(out.value, "ccc");
        assert_eq!(out.report_index, 1);
        assert_eq!(out.total_power, 11);
    }

    #[test]
    fn test_mode_tie_keeps_first_seen_value() {
        let reports = vec![report(1, "bb", 3), report(2, "aa", 3)];
        let out = WeightedMode.aggregate(&reports).expect("aggregate");
        assert_eq!(out.value, "bb");
        assert_eq!(out.report_index, 0);
    }

    #[test]
    fn test_mode_reporters_in_input_order() {
        let reports = vec![report(3, "x", 1), report(1, "y", 5), report(2, "x", 1)];
        let out = WeightedMode.aggregate(&reports).expect("aggregate");
        assert_eq!(out.value, "y");
        assert_eq!(out.report_index, 1);
        let order: Vec<_> = out.reporters.iter().map(|r| r.reporter.clone()).collect();
        let expected: Vec<_> = reports.iter().map(|r| r.reporter.clone()).collect();
        assert_eq!(order, expected);
    }

    proptest! {
        #[test]
        fn prop_mode_value_has_maximal_weight(
            entries in proptest::collection::vec((0u8..4, 1u64..50), 1..20)
        ) {
            let reports: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (v, p))| report(i as u8 + 1, &format!("0{v}"), *p))
                .collect();
            let out = WeightedMode.aggregate(&reports).expect("aggregate");
            let weight_of = |value: &str| -> u64 {
                reports.iter().filter(|r| r.value == value).map(|r| r.power).sum()
            };
            let winning = weight_of(&out.value);
            for r in &reports {
                prop_assert!(weight_of(&r.value) <= winning);
            }
            prop_assert_eq!(&reports[out.report_index].value, &out.value);
        }
    }
}
