//! Weighted median over big-integer values.

use alloy_primitives::U256;
use tally_types::registry::decode_hex_value;
use tally_types::{AggregateReporter, MicroReport};

use super::{AggregationOutcome, AggregationStrategy};
use crate::{OracleError, Result};

/// Selects the report at which cumulative power first reaches half of the
/// total, after sorting values ascending. The half is exact, so an odd total
/// is not rounded down.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedMedian;

/// Parse a reported hex value as an unsigned 256-bit integer.
fn parse_value(value: &str) -> Result<U256> {
    let bytes = decode_hex_value(value)?;
    if bytes.len() > 32 {
        return Err(OracleError::InvalidValue(format!(
            "{} bytes do not fit a uint256",
            bytes.len()
        )));
    }
    Ok(U256::from_be_slice(&bytes))
}

/// Check a value can take part in a median.
pub(crate) fn validate_value(value: &str) -> Result<()> {
    parse_value(value).map(|_| ())
}

/// Low 64 bits of `v`, as a float.
fn low_f64(v: U256) -> f64 {
    v.as_limbs()[0] as f64
}

/// Power-weighted standard deviation. Values are truncated to their low
/// 64 bits, so this is informational only.
fn weighted_std_dev(entries: &[(usize, U256)], reports: &[MicroReport]) -> f64 {
    let mut weight_sum = 0f64;
    let mut weighted = 0f64;
    for (i, v) in entries {
        let p = reports[*i].power as f64;
        weight_sum += p;
        weighted += p * low_f64(*v);
    }
    if weight_sum == 0.0 {
        return 0.0;
    }
    let mean = weighted / weight_sum;
    let variance = entries
        .iter()
        .map(|(i, v)| {
            let d = low_f64(*v) - mean;
            reports[*i].power as f64 * d * d
        })
        .sum::<f64>()
        / weight_sum;
    variance.sqrt()
}

impl AggregationStrategy for WeightedMedian {
    fn name(&self) -> &'static str {
        "weighted-median"
    }

    fn aggregate(&self, reports: &[MicroReport]) -> Result<AggregationOutcome> {
        if reports.is_empty() {
            return Err(OracleError::NoReportsToAggregate);
        }
        let mut entries = reports
            .iter()
            .enumerate()
            .map(|(i, r)| parse_value(&r.value).map(|v| (i, v)))
            .collect::<Result<Vec<_>>>()?;
        // Stable: equal values keep submission order.
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        let total_power = reports
            .iter()
            .try_fold(0u64, |acc, r| acc.checked_add(r.power))
            .ok_or(OracleError::Overflow)?;

        let mut cumulative = 0u64;
        let mut selected = entries.len() - 1;
        for (pos, (i, _)) in entries.iter().enumerate() {
            cumulative = cumulative
                .checked_add(reports[*i].power)
                .ok_or(OracleError::Overflow)?;
            if 2 * u128::from(cumulative) >= u128::from(total_power) {
                selected = pos;
                break;
            }
        }

        let (winner_idx, _) = entries[selected];
        let winner = &reports[winner_idx];
        let reporters = entries
            .iter()
            .map(|(i, _)| AggregateReporter {
                reporter: reports[*i].reporter.clone(),
                power: reports[*i].power,
                block_number: reports[*i].block_number,
            })
            .collect();

        Ok(AggregationOutcome {
            report_index: selected,
            value: winner.value.clone(),
            reporter: winner.reporter.clone(),
            reporter_power: winner.power,
            total_power,
            std_dev: weighted_std_dev(&entries, reports),
            reporters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::report;
    use proptest::prelude::*;

    fn run(values: &[u64], powers: &[u64]) -> AggregationOutcome {
        let reports: Vec<_> = values
            .iter()
            .zip(powers)
            .enumerate()
            .map(|(i, (v, p))| report(i as u8 + 1, &format!("{v:x}"), *p))
            .collect();
        WeightedMedian.aggregate(&reports).expect("aggregate")
    }

    #[test]
    fn test_weighted_median_picks_heavy_report() {
        let reports = vec![
            report(1, "0a", 10),
            report(2, "14", 4),
            report(3, "1e", 2),
            report(4, "28", 20),
            report(5, "32", 8),
        ];
        let out = WeightedMedian.aggregate(&reports).expect("aggregate");
        assert_eq!(out.value, "28");
        assert_eq!(out.reporter_power, 20);
        assert_eq!(out.report_index, 3);
        assert_eq!(out.total_power, 44);
        assert_eq!(out.reporter, reports[3].reporter);
    }

    #[test]
    fn test_equal_powers_pick_lower_middle() {
        let out = run(&[10, 10, 20, 20], &[1, 1, 1, 1]);
        assert_eq!(out.report_index, 1);
        assert_eq!(out.value, "a");
    }

    #[test]
    fn test_odd_total_power_is_not_rounded_down() {
        let out = run(&[30, 10, 20], &[1, 1, 1]);
        assert_eq!(out.value, "14");
    }

    #[test]
    fn test_uneven_powers() {
        let out = run(&[10, 10, 20, 20], &[1, 2, 1, 2]);
        assert_eq!(out.report_index, 1);
    }

    #[test]
    fn test_odd_count_equal_powers() {
        let out = run(&[10, 20, 30, 40, 50], &[5, 5, 5, 5, 5]);
        assert_eq!(out.report_index, 2);
        assert_eq!(out.value, "1e");
    }

    #[test]
    fn test_reporters_listed_in_sorted_order() {
        let reports = vec![report(1, "30", 1), report(2, "10", 1), report(3, "20", 1)];
        let out = WeightedMedian.aggregate(&reports).expect("aggregate");
        let order: Vec<_> = out.reporters.iter().map(|r| r.reporter.clone()).collect();
        assert_eq!(
            order,
            vec![
                reports[1].reporter.clone(),
                reports[2].reporter.clone(),
                reports[0].reporter.clone()
            ]
        );
    }

    #[test]
    fn test_std_dev() {
        let out = run(&[10, 10], &[3, 3]);
        assert_eq!(out.std_dev, 0.0);
        let out = run(&[0, 10], &[1, 1]);
        assert!((out.std_dev - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_integer_value() {
        let reports = vec![report(1, "zz", 1)];
        assert!(matches!(
            WeightedMedian.aggregate(&reports),
            Err(OracleError::InvalidValue(_))
        ));
        let wide = "11".repeat(33);
        assert!(validate_value(&wide).is_err());
        assert!(validate_value(&"ff".repeat(32)).is_ok());
    }

    #[test]
    fn test_empty_round() {
        assert!(matches!(
            WeightedMedian.aggregate(&[]),
            Err(OracleError::NoReportsToAggregate)
        ));
    }

    proptest! {
        #[test]
        fn prop_median_is_a_submitted_value(
            entries in proptest::collection::vec((0u64..1_000_000, 1u64..1_000), 1..20)
        ) {
            let (values, powers): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
            let out = run(&values, &powers);
            let picked = u64::from_str_radix(&out.value, 16).expect("hex");
            prop_assert!(values.contains(&picked));
            prop_assert_eq!(out.total_power, powers.iter().sum::<u64>());

            // At least half the power sits at or below the median, and at
            // most half strictly below it.
            let weight = |keep: &dyn Fn(u64) -> bool| -> u64 {
                values
                    .iter()
                    .zip(&powers)
                    .filter(|(v, _)| keep(**v))
                    .map(|(_, p)| *p)
                    .sum()
            };
            let at_or_below = weight(&|v| v <= picked);
            let below = weight(&|v| v < picked);
            prop_assert!(2 * at_or_below >= out.total_power);
            prop_assert!(2 * below < out.total_power);
        }

        #[test]
        fn prop_equal_powers_give_lower_median(
            values in proptest::collection::vec(0u64..1_000_000, 1..25),
            power in 1u64..1_000,
        ) {
            let powers = vec![power; values.len()];
            let out = run(&values, &powers);
            let mut sorted = values.clone();
            sorted.sort_unstable();
            let expected = sorted[(sorted.len() - 1) / 2];
            prop_assert_eq!(out.value, format!("{expected:x}"));
        }

        #[test]
        fn prop_median_ignores_input_order(
            entries in proptest::collection::vec((0u64..1_000, 1u64..100), 1..12)
        ) {
            let (values, powers): (Vec<_>, Vec<_>) = entries.iter().copied().unzip();
            let forward = run(&values, &powers);
            let (rv, rp): (Vec<_>, Vec<_>) = entries.into_iter().rev().unzip();
            let backward = run(&rv, &rp);
            prop_assert_eq!(forward.value, backward.value);
        }
    }
}
