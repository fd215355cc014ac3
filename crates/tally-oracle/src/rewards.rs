//! Proportional reward allocation.
//!
//! A reward is split across the reporters of an aggregate in proportion to
//! `power * reports`, where `reports` is how many times the reporter appears.
//! Shares are computed in [`Dec`] and rounded to the nearest integer; the
//! running total is capped at the reward so rounding can never overpay.

use std::collections::BTreeMap;

use tally_types::{AccAddress, AggregateReporter, Dec};

use crate::expected_keepers::RewardDestination;
use crate::keeper::Keeper;
use crate::{OracleError, Result};

/// Power and occurrence count of one reporter in a reward split.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Share {
    power: u64,
    count: u64,
}

impl Share {
    fn weight(&self) -> u128 {
        u128::from(self.power) * u128::from(self.count)
    }
}

/// Compute each reporter's share of `reward`, ordered by address.
///
/// The power of a reporter's first appearance is used for all of its
/// appearances.
pub fn split_reward(
    reporters: &[AggregateReporter],
    reward: u128,
) -> Result<Vec<(AccAddress, u128)>> {
    let mut shares: BTreeMap<&AccAddress, Share> = BTreeMap::new();
    for r in reporters {
        let share = shares.entry(&r.reporter).or_insert(Share {
            power: r.power,
            count: 0,
        });
        share.count += 1;
    }

    let total = shares
        .values()
        .try_fold(0u128, |acc, s| acc.checked_add(s.weight()))
        .ok_or(OracleError::Overflow)?;
    if total == 0 || reward == 0 {
        return Ok(Vec::new());
    }
    let total = Dec::from_int(total);
    let reward_dec = Dec::from_int(reward);

    let mut paid = 0u128;
    let mut out = Vec::with_capacity(shares.len());
    for (addr, share) in shares {
        let amount = Dec::from_int(share.weight())
            .checked_quo(total)
            .and_then(|ratio| ratio.checked_mul_truncate(reward_dec))
            .and_then(Dec::round_int)
            .ok_or(OracleError::Overflow)?;
        let amount = amount.min(reward - paid);
        paid += amount;
        out.push((addr.clone(), amount));
    }
    Ok(out)
}

impl Keeper {
    /// Split `reward` across `reporters`, credit each share, and move the
    /// paid total from `from_pool` to the destination's pool.
    ///
    /// Returns the amount actually paid, which is at most `reward`.
    pub(crate) fn allocate_rewards(
        &self,
        reporters: &[AggregateReporter],
        reward: u128,
        from_pool: &str,
        destination: RewardDestination,
    ) -> Result<u128> {
        self.atomic("allocate_rewards", || {
            let shares = split_reward(reporters, reward)?;
            let paid: u128 = shares.iter().map(|(_, amount)| amount).sum();
            if paid > 0 {
                self.send_between_modules(from_pool, destination.pool(), paid)?;
            }
            for (addr, amount) in shares.iter().filter(|(_, amount)| *amount > 0) {
                self.credit_reward(addr, *amount, destination);
            }
            tracing::debug!(
                reward,
                paid,
                from_pool,
                reporters = reporters.len(),
                "rewards allocated"
            );
            Ok(paid)
        })
    }
}
