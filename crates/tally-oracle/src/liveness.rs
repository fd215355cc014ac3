//! Liveness-weighted distribution of time-based rewards.
//!
//! Participation is accumulated when cycle-list rounds are aggregated (see
//! [`Keeper::close_round`]). Every `liveness_cycles` wraps of the cycle
//! list the whole time-based-reward pool, plus dust carried from the last
//! period, is split across reporters by `accumulated_power * ratio`, where
//! `ratio` is the share of their in-turn opportunities they answered.
//!
//! All arithmetic is [`Dec`]; whatever truncation leaves unpaid becomes the
//! next period's dust.

use tally_db::queries::{liveness, state};
use tally_types::query_data::{self, TRB_BRIDGE_QUERY_TYPE};
use tally_types::{
    AccAddress, Dec, OracleEvent, QueryId, QueryMeta, TIME_BASED_REWARDS_POOL, TIPS_ESCROW_POOL,
};

use crate::expected_keepers::RewardDestination;
use crate::keeper::Keeper;
use crate::{OracleError, Result};

/// Id that liveness is tracked under for a round.
///
/// Every bridge deposit is a distinct query, so they all share one marker
/// slot instead.
pub fn tracking_id(meta: &QueryMeta) -> QueryId {
    if meta.query_type == TRB_BRIDGE_QUERY_TYPE {
        bridge_marker_id()
    } else {
        meta.query_id
    }
}

/// The shared liveness slot of bridge deposits.
pub fn bridge_marker_id() -> QueryId {
    query_data::query_id(TRB_BRIDGE_QUERY_TYPE.as_bytes())
}

/// Outcome of one distribution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LivenessPayout {
    /// Rewards credited per reporter, ordered by address.
    pub rewards: Vec<(AccAddress, u128)>,
    pub distributed: u128,
    /// Remainder carried into the next period.
    pub dust: u128,
}

impl Keeper {
    /// Count one cycle-list wrap and distribute if the period is over.
    pub(crate) fn check_and_distribute_liveness_rewards(&self) -> Result<Option<LivenessPayout>> {
        self.atomic("liveness_check", || {
            let cycles = state::increment(&self.conn, state::CYCLE_COUNT)?;
            let params = self.params()?;
            if cycles % params.liveness_cycles != 0 {
                return Ok(None);
            }
            self.distribute_liveness_rewards().map(Some)
        })
    }

    /// Pay out the time-based-reward pool and reset the period.
    ///
    /// Period records are cleared on every path, including when nothing is
    /// paid.
    pub fn distribute_liveness_rewards(&self) -> Result<LivenessPayout> {
        self.atomic("liveness_distribution", || {
            let payout = self.compute_and_pay_liveness()?;
            liveness::reset_period(&self.conn)?;
            Ok(payout)
        })
    }

    fn compute_and_pay_liveness(&self) -> Result<LivenessPayout> {
        let carried = state::get_u128(&self.conn, state::DUST)?;
        let unchanged = LivenessPayout {
            dust: carried,
            ..LivenessPayout::default()
        };

        let tbr = self.module_balance(TIME_BASED_REWARDS_POOL)?;
        if tbr == 0 {
            tracing::debug!("no time-based rewards to distribute");
            return Ok(unchanged);
        }
        let slots = tally_db::queries::cyclelist::len(&self.conn)?;
        if slots == 0 {
            return Ok(unchanged);
        }
        let max_liveness = Dec::from_int(u128::from(slots));

        let mut weights = Vec::new();
        for (reporter, record) in liveness::records(&self.conn)? {
            let ratio = self
                .weighted_liveness(&reporter)?
                .checked_quo(max_liveness)
                .ok_or(OracleError::Overflow)?;
            let weight = Dec::from_int(record.accumulated_power)
                .checked_mul(ratio)
                .ok_or(OracleError::Overflow)?;
            if weight.is_positive() {
                weights.push((reporter, weight));
            }
        }
        if weights.is_empty() {
            tracing::debug!(tbr, "no reporter qualified for liveness rewards");
            return Ok(unchanged);
        }

        self.send_between_modules(TIME_BASED_REWARDS_POOL, TIPS_ESCROW_POOL, tbr)?;

        let total = tbr.checked_add(carried).ok_or(OracleError::Overflow)?;
        let total_dec = Dec::from_int(total);
        let weight_sum = weights
            .iter()
            .try_fold(Dec::zero(), |acc, (_, w)| acc.checked_add(*w))
            .ok_or(OracleError::Overflow)?;

        let mut payout = LivenessPayout::default();
        for (reporter, weight) in weights {
            let amount = weight
                .checked_quo_truncate(weight_sum)
                .and_then(|share| share.checked_mul_truncate(total_dec))
                .and_then(Dec::truncate_int)
                .ok_or(OracleError::Overflow)?;
            if amount > 0 {
                self.credit_reward(&reporter, amount, RewardDestination::Stake);
                payout.distributed += amount;
            }
            payout.rewards.push((reporter, amount));
        }
        payout.dust = total.saturating_sub(payout.distributed);
        state::set_u128(&self.conn, state::DUST, payout.dust)?;

        tracing::info!(
            tbr,
            distributed = payout.distributed,
            reporters = payout.rewards.len(),
            dust = payout.dust,
            "liveness rewards distributed"
        );
        self.emit(OracleEvent::LivenessRewardsDistributed {
            total_distributed: tbr.to_string(),
            allocated: payout.distributed.to_string(),
            reporter_count: payout.rewards.len(),
            dust: payout.dust.to_string(),
        });
        Ok(payout)
    }

    /// `Σ min(answers, opportunities) / opportunities` over the queries a
    /// reporter answered this period.
    fn weighted_liveness(&self, reporter: &AccAddress) -> Result<Dec> {
        let mut total = Dec::zero();
        for (query_id, answers) in liveness::reporter_queries(&self.conn, reporter)? {
            let opportunities = liveness::opportunities(&self.conn, &query_id)?;
            if opportunities == 0 {
                continue;
            }
            let credit = Dec::from_ratio(
                u128::from(answers.min(opportunities)),
                u128::from(opportunities),
            )
            .ok_or(OracleError::Overflow)?;
            total = total.checked_add(credit).ok_or(OracleError::Overflow)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEnv;
    use tally_db::queries::cyclelist;

    struct Period {
        env: MockEnv,
        keeper: Keeper,
    }

    impl Period {
        fn new(slots: usize, tbr: u128) -> Self {
            let env = MockEnv::new();
            env.bank.fund_module(TIME_BASED_REWARDS_POOL, tbr);
            let keeper = env.keeper();
            let list: Vec<_> = (0..slots).map(|i| env.spot_price(&format!("a{i}"))).collect();
            cyclelist::replace(keeper.connection(), &list).expect("cyclelist");
            Self { env, keeper }
        }

        fn query(&self, i: usize) -> QueryId {
            query_data::query_id(&self.env.spot_price(&format!("a{i}")))
        }

        fn opportunity(&self, i: usize) {
            liveness::increment_opportunities(self.keeper.connection(), &self.query(i))
                .expect("opp");
        }

        fn answer(&self, reporter: u8, i: usize, power: u64) {
            let conn = self.keeper.connection();
            let addr = MockEnv::address(reporter);
            liveness::track_reporter_query(conn, &addr, &self.query(i)).expect("track");
            liveness::update_record(conn, &addr, power).expect("record");
        }
    }

    #[test]
    fn test_full_participation_beats_partial() {
        let p = Period::new(1, 1_000);
        p.opportunity(0);
        p.opportunity(0);
        p.answer(1, 0, 5);
        p.answer(1, 0, 5);
        p.answer(2, 0, 10);

        let payout = p.keeper.distribute_liveness_rewards().expect("distribute");
        // Both accumulated power 10; reporter 2 answered half.
        let map: std::collections::BTreeMap<_, _> = payout.rewards.into_iter().collect();
        assert_eq!(map[&MockEnv::address(1)], 666);
        assert_eq!(map[&MockEnv::address(2)], 333);
        assert_eq!(payout.distributed, 999);
        assert_eq!(payout.dust, 1);
        assert_eq!(state::get_u128(p.keeper.connection(), state::DUST).expect("dust"), 1);
        assert_eq!(p.env.bank.balance(TIME_BASED_REWARDS_POOL), 0);
        assert_eq!(p.env.bank.balance(TIPS_ESCROW_POOL), 1_000);
    }

    #[test]
    fn test_dust_carried_into_next_period() {
        let p = Period::new(1, 1_000);
        state::set_u128(p.keeper.connection(), state::DUST, 1).expect("dust");
        p.opportunity(0);
        p.answer(1, 0, 5);
        let payout = p.keeper.distribute_liveness_rewards().expect("distribute");
        assert_eq!(payout.distributed, 1_001);
        assert_eq!(payout.dust, 0);
    }

    #[test]
    fn test_empty_pool_resets_without_paying() {
        let p = Period::new(1, 0);
        p.opportunity(0);
        p.answer(1, 0, 5);
        let payout = p.keeper.distribute_liveness_rewards().expect("distribute");
        assert_eq!(payout.distributed, 0);
        assert!(p.env.reporters.rewards().is_empty());
        let conn = p.keeper.connection();
        assert!(liveness::record(conn, &MockEnv::address(1)).expect("record").is_none());
        assert_eq!(liveness::opportunities(conn, &p.query(0)).expect("opps"), 0);
    }

    #[test]
    fn test_no_qualifying_reporter_leaves_pool() {
        let p = Period::new(2, 500);
        let payout = p.keeper.distribute_liveness_rewards().expect("distribute");
        assert_eq!(payout.distributed, 0);
        assert_eq!(p.env.bank.balance(TIME_BASED_REWARDS_POOL), 500);
        assert!(p.keeper.take_events().is_empty());
    }

    #[test]
    fn test_zero_weight_reporters_reset_without_paying() {
        let p = Period::new(2, 500);
        p.opportunity(0);
        // No power behind the answer.
        p.answer(1, 0, 0);
        // Power behind an answer to a query that had no opportunity.
        p.answer(2, 1, 5);

        for round in 0..2 {
            let payout = p.keeper.distribute_liveness_rewards().expect("distribute");
            assert_eq!(payout.distributed, 0, "round {round}");
            assert!(payout.rewards.is_empty());
            assert_eq!(p.env.bank.balance(TIME_BASED_REWARDS_POOL), 500);
            assert_eq!(p.env.bank.balance(TIPS_ESCROW_POOL), 0);
            assert!(p.env.reporters.rewards().is_empty());
            assert!(p.keeper.take_events().is_empty());

            let conn = p.keeper.connection();
            assert!(liveness::records(conn).expect("records").is_empty());
            assert_eq!(liveness::opportunities(conn, &p.query(0)).expect("opps"), 0);
            for reporter in [1, 2] {
                let answered = liveness::reporter_queries(conn, &MockEnv::address(reporter))
                    .expect("queries");
                assert!(answered.is_empty());
            }
        }
    }

    #[test]
    fn test_empty_cyclelist_resets() {
        let p = Period::new(0, 500);
        p.answer(1, 0, 5);
        p.keeper.distribute_liveness_rewards().expect("distribute");
        assert_eq!(p.env.bank.balance(TIME_BASED_REWARDS_POOL), 500);
        assert!(liveness::record(p.keeper.connection(), &MockEnv::address(1))
            .expect("record")
            .is_none());
    }

    #[test]
    fn test_distribution_waits_for_liveness_cycles() {
        let p = Period::new(1, 100);
        let mut params = p.keeper.params().expect("params");
        params.liveness_cycles = 2;
        tally_db::queries::params::set(p.keeper.connection(), &params).expect("set");
        p.opportunity(0);
        p.answer(1, 0, 1);

        assert!(p.keeper.check_and_distribute_liveness_rewards().expect("first").is_none());
        let payout = p
            .keeper
            .check_and_distribute_liveness_rewards()
            .expect("second")
            .expect("distributed");
        assert_eq!(payout.distributed, 100);
    }

    #[test]
    fn test_bridge_rounds_share_marker() {
        let data = query_data::encode_bridge(true, 9);
        let meta = QueryMeta {
            id: 0,
            round: 1,
            query_id: query_data::query_id(&data),
            amount: 0,
            expiration: 1,
            report_buffer_window: 1,
            has_revealed_reports: true,
            query_data: data,
            query_type: TRB_BRIDGE_QUERY_TYPE.into(),
            cycle_list: true,
        };
        assert_eq!(tracking_id(&meta), bridge_marker_id());
    }
}
