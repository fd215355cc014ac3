//! Read-only query surface.
//!
//! [`Querier`] borrows the keeper and never writes. Lookups that name a
//! single entity return [`OracleError::NoAggregate`] or
//! [`OracleError::NotFound`] when it does not exist, so callers can tell
//! "absent" from "malformed".

use tally_db::queries::{aggregates, liveness, no_stake, query_meta, reports, state, tips};
use tally_types::{
    query_id_hex, Aggregate, Dec, LivenessRecord, MicroReport, NoStakeMicroReport, Params, QueryId,
    QueryMeta, ReporterLiveness, EXTRA_REWARDS_POOL, TIME_BASED_REWARDS_POOL,
};

use crate::keeper::Keeper;
use crate::{OracleError, Result};

/// Read-only view over a [`Keeper`].
#[derive(Clone, Copy)]
pub struct Querier<'a> {
    keeper: &'a Keeper,
}

impl Keeper {
    pub fn querier(&self) -> Querier<'_> {
        Querier { keeper: self }
    }
}

fn no_aggregate(query_id: &QueryId) -> OracleError {
    OracleError::NoAggregate(query_id_hex(query_id))
}

impl Querier<'_> {
    // --- cycle list ---

    pub fn current_cyclelist_query(&self) -> Result<Vec<u8>> {
        self.keeper.current_query_in_cycle_list()
    }

    pub fn next_cyclelist_query(&self) -> Result<Vec<u8>> {
        self.keeper.next_query_in_cycle_list()
    }

    pub fn cyclelist(&self) -> Result<Vec<Vec<u8>>> {
        self.keeper.cyclelist()
    }

    // --- reports ---

    pub fn reports_by_query_id(&self, query_id: &QueryId) -> Result<Vec<MicroReport>> {
        Ok(reports::by_query_id(&self.keeper.conn, query_id)?)
    }

    pub fn reports_by_reporter(&self, reporter: &str) -> Result<Vec<MicroReport>> {
        let reporter = self.keeper.parse_address(reporter)?;
        Ok(reports::by_reporter(&self.keeper.conn, &reporter)?)
    }

    pub fn reports_by_reporter_and_query(
        &self,
        reporter: &str,
        query_id: &QueryId,
    ) -> Result<Vec<MicroReport>> {
        let reporter = self.keeper.parse_address(reporter)?;
        Ok(reports::by_reporter_and_query(&self.keeper.conn, &reporter, query_id)?)
    }

    /// Reports that fed the aggregate at `timestamp_ms`.
    pub fn reports_by_aggregate(
        &self,
        query_id: &QueryId,
        timestamp_ms: u64,
    ) -> Result<Vec<MicroReport>> {
        let aggregate = self.aggregate_at(query_id, timestamp_ms)?;
        Ok(reports::by_meta(&self.keeper.conn, query_id, aggregate.meta_id)?)
    }

    // --- aggregates ---

    /// The newest aggregate of a query.
    ///
    /// # Errors
    ///
    /// [`OracleError::NoAggregate`] if the query was never aggregated.
    pub fn current_aggregate(&self, query_id: &QueryId) -> Result<Aggregate> {
        aggregates::latest(&self.keeper.conn, query_id)?.ok_or_else(|| no_aggregate(query_id))
    }

    /// The newest unflagged aggregate strictly before `timestamp_ms`.
    pub fn aggregate_before(&self, query_id: &QueryId, timestamp_ms: u64) -> Result<Aggregate> {
        aggregates::before(&self.keeper.conn, query_id, timestamp_ms)?
            .ok_or_else(|| no_aggregate(query_id))
    }

    /// The oldest unflagged aggregate strictly after `timestamp_ms`.
    pub fn aggregate_after(&self, query_id: &QueryId, timestamp_ms: u64) -> Result<Aggregate> {
        aggregates::after(&self.keeper.conn, query_id, timestamp_ms)?
            .ok_or_else(|| no_aggregate(query_id))
    }

    pub fn aggregate_at(&self, query_id: &QueryId, timestamp_ms: u64) -> Result<Aggregate> {
        Ok(aggregates::get(&self.keeper.conn, query_id, timestamp_ms)?)
    }

    pub fn aggregates_by_height(&self, height: u64) -> Result<Vec<Aggregate>> {
        Ok(aggregates::by_height(&self.keeper.conn, height)?)
    }

    pub fn aggregates_by_micro_height(&self, micro_height: u64) -> Result<Vec<Aggregate>> {
        Ok(aggregates::by_micro_height(&self.keeper.conn, micro_height)?)
    }

    // --- no-stake reports ---

    pub fn no_stake_reports_by_reporter(&self, reporter: &str) -> Result<Vec<NoStakeMicroReport>> {
        let reporter = self.keeper.parse_address(reporter)?;
        Ok(no_stake::by_reporter(&self.keeper.conn, &reporter)?)
    }

    pub fn no_stake_reports_by_query_id(
        &self,
        query_id: &QueryId,
    ) -> Result<Vec<NoStakeMicroReport>> {
        Ok(no_stake::by_query_id(&self.keeper.conn, query_id)?)
    }

    // --- tips ---

    /// Open rounds that carry a tip.
    pub fn tipped_queries(&self) -> Result<Vec<QueryMeta>> {
        Ok(query_meta::tipped(&self.keeper.conn)?)
    }

    /// Tip held by the open round of a query, zero without one.
    pub fn query_tip(&self, query_id: &QueryId) -> Result<u128> {
        Ok(self
            .keeper
            .current_query(query_id)?
            .map_or(0, |meta| meta.amount))
    }

    pub fn user_tip_total(&self, tipper: &str) -> Result<u128> {
        let tipper = self.keeper.parse_address(tipper)?;
        Ok(tips::tipper_total(&self.keeper.conn, &tipper)?)
    }

    pub fn total_tips(&self) -> Result<u128> {
        Ok(tips::total(&self.keeper.conn)?)
    }

    // --- liveness ---

    /// Lifetime share of aggregates a reporter took part in.
    pub fn reporter_liveness(&self, reporter: &str) -> Result<ReporterLiveness> {
        let reporter = self.keeper.parse_address(reporter)?;
        let conn = &self.keeper.conn;
        let (reporter_reports, last) = match liveness::reporter_stats(conn, &reporter)? {
            Some((reports, last)) => (reports, Some(last)),
            None => (0, None),
        };
        let total_aggregates = state::get_u64(conn, state::TOTAL_AGGREGATES)?;
        let percent_liveness = if total_aggregates == 0 {
            Dec::zero()
        } else {
            let scaled = u128::from(reporter_reports)
                .checked_mul(100)
                .ok_or(OracleError::Overflow)?;
            Dec::from_ratio(scaled, u128::from(total_aggregates)).ok_or(OracleError::Overflow)?
        };
        Ok(ReporterLiveness {
            reporter_reports,
            total_aggregates,
            percent_liveness,
            last_report_time_ms: last,
        })
    }

    /// Participation recorded so far in the current liveness period.
    pub fn liveness_record(&self, reporter: &str) -> Result<Option<LivenessRecord>> {
        let reporter = self.keeper.parse_address(reporter)?;
        Ok(liveness::record(&self.keeper.conn, &reporter)?)
    }

    pub fn dust(&self) -> Result<u128> {
        Ok(state::get_u128(&self.keeper.conn, state::DUST)?)
    }

    // --- pools and params ---

    pub fn time_based_rewards_balance(&self) -> Result<u128> {
        self.keeper.module_balance(TIME_BASED_REWARDS_POOL)
    }

    pub fn extra_rewards_balance(&self) -> Result<u128> {
        self.keeper.module_balance(EXTRA_REWARDS_POOL)
    }

    /// Effective daily extra-rewards rate.
    pub fn extra_rewards_rate(&self) -> Result<u64> {
        Ok(self.keeper.params()?.extra_rewards_rate())
    }

    pub fn params(&self) -> Result<Params> {
        self.keeper.params()
    }

    /// The open round of a query.
    ///
    /// # Errors
    ///
    /// [`OracleError::NotFound`] if the query has no open round.
    pub fn current_query(&self, query_id: &QueryId) -> Result<QueryMeta> {
        self.keeper.current_query(query_id)?.ok_or_else(|| {
            OracleError::NotFound(format!("open round for query {}", query_id_hex(query_id)))
        })
    }
}
