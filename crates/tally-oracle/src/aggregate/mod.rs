//! Aggregation strategies and round closing.
//!
//! A data spec names its aggregation method; [`StrategyTable`] maps that
//! name to an [`AggregationStrategy`]. Closing a round runs the strategy
//! over the round's reports, persists the [`Aggregate`], records liveness
//! and pays out the round's tips.
//!
//! ## Strategies
//!
//! - [`median::WeightedMedian`] — `weighted-median`, integer values
//! - [`mode::WeightedMode`] — `weighted-mode`, any value

pub mod median;
pub mod mode;

use std::collections::HashMap;
use std::sync::Arc;

use tally_db::queries::{aggregates, liveness, query_meta, reports, state};
use tally_types::{
    query_id_hex, AccAddress, Aggregate, AggregateReporter, MicroReport, OracleEvent, QueryId,
    QueryMeta, ORACLE_MODULE,
};

use crate::expected_keepers::RewardDestination;
use crate::keeper::{BlockContext, Keeper};
use crate::{OracleError, Result};

/// Result of running a strategy over one round.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationOutcome {
    /// Position of the selected report in the strategy's ordering.
    pub report_index: usize,
    pub value: String,
    pub reporter: AccAddress,
    pub reporter_power: u64,
    /// Sum of the power of every report.
    pub total_power: u64,
    pub std_dev: f64,
    pub reporters: Vec<AggregateReporter>,
}

/// A deterministic way to reduce a round's reports to one value.
pub trait AggregationStrategy {
    /// Name data specs use to select this strategy.
    fn name(&self) -> &'static str;

    /// Reduce `reports` to a single outcome.
    ///
    /// # Errors
    ///
    /// [`OracleError::NoReportsToAggregate`] on an empty slice, and
    /// strategy-specific value errors.
    fn aggregate(&self, reports: &[MicroReport]) -> Result<AggregationOutcome>;
}

/// Registered strategies, keyed by name.
#[derive(Clone)]
pub struct StrategyTable {
    strategies: HashMap<&'static str, Arc<dyn AggregationStrategy>>,
}

impl Default for StrategyTable {
    fn default() -> Self {
        let mut table = Self {
            strategies: HashMap::new(),
        };
        table.register(Arc::new(median::WeightedMedian));
        table.register(Arc::new(mode::WeightedMode));
        table
    }
}

impl StrategyTable {
    /// Add or replace a strategy under its own name.
    pub fn register(&mut self, strategy: Arc<dyn AggregationStrategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    /// Look up a strategy.
    ///
    /// # Errors
    ///
    /// [`OracleError::UnknownAggregationMethod`] if none is registered.
    pub fn get(&self, name: &str) -> Result<Arc<dyn AggregationStrategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| OracleError::UnknownAggregationMethod(name.to_string()))
    }
}

impl Keeper {
    /// Close a round into an aggregate.
    ///
    /// Runs as its own unit: on error neither the aggregate nor any
    /// liveness or reward effect is kept, and the round stays open.
    ///
    /// # Errors
    ///
    /// [`OracleError::NoReportsToAggregate`] if the round has no reports,
    /// plus strategy, storage and collaborator errors.
    pub fn close_round(&self, ctx: &BlockContext, meta: &QueryMeta) -> Result<Aggregate> {
        self.atomic("close_round", || self.close_round_inner(ctx, meta))
    }

    fn close_round_inner(&self, ctx: &BlockContext, meta: &QueryMeta) -> Result<Aggregate> {
        let round_reports = reports::by_meta(&self.conn, &meta.query_id, meta.id)?;
        let first = round_reports.first().ok_or(OracleError::NoReportsToAggregate)?;
        let strategy = self.strategies.get(&first.aggregate_method)?;
        let outcome = strategy.aggregate(&round_reports)?;

        let micro_height = round_reports
            .iter()
            .map(|r| r.block_number)
            .max()
            .unwrap_or(ctx.height);
        let aggregate = Aggregate {
            query_id: meta.query_id,
            aggregate_value: outcome.value,
            aggregate_reporter: outcome.reporter,
            aggregate_power: outcome.total_power,
            reporter_power: outcome.reporter_power,
            standard_deviation: outcome.std_dev,
            reporters: outcome.reporters,
            flagged: false,
            index: aggregates::count(&self.conn, &meta.query_id)?,
            aggregate_report_index: outcome.report_index as u64,
            height: ctx.height,
            micro_height,
            meta_id: meta.id,
            timestamp_ms: ctx.time_ms,
        };
        aggregates::insert(&self.conn, &aggregate)?;
        state::increment(&self.conn, state::TOTAL_AGGREGATES)?;

        for r in &round_reports {
            liveness::record_report(&self.conn, &r.reporter, ctx.time_ms)?;
        }

        if meta.cycle_list {
            let tracking_id = crate::liveness::tracking_id(meta);
            liveness::increment_opportunities(&self.conn, &tracking_id)?;
            for r in &round_reports {
                liveness::track_reporter_query(&self.conn, &r.reporter, &tracking_id)?;
                liveness::update_record(&self.conn, &r.reporter, r.power)?;
            }
            state::increment(&self.conn, state::TOTAL_QUERIES_IN_PERIOD)?;
        }

        if meta.amount > 0 {
            self.allocate_rewards(
                &aggregate.reporters,
                meta.amount,
                ORACLE_MODULE,
                RewardDestination::Escrow,
            )?;
        }

        query_meta::delete(&self.conn, &meta.query_id)?;

        tracing::info!(
            query_id = %query_id_hex(&meta.query_id),
            meta_id = meta.id,
            value = %aggregate.aggregate_value,
            power = aggregate.aggregate_power,
            reports = round_reports.len(),
            tips = meta.amount,
            "round aggregated"
        );
        self.emit(OracleEvent::AggregateReport {
            query_id: query_id_hex(&meta.query_id),
            value: aggregate.aggregate_value.clone(),
            aggregate_power: aggregate.aggregate_power,
            micro_report_height: micro_height,
            timestamp_ms: aggregate.timestamp_ms,
            meta_id: meta.id,
        });
        Ok(aggregate)
    }

    /// Mark an aggregate as disputed. Flagged aggregates are skipped by the
    /// before/after lookups.
    ///
    /// # Errors
    ///
    /// [`OracleError::NotFound`] if no aggregate exists at that timestamp.
    pub fn flag_aggregate_report(&self, query_id: &QueryId, timestamp_ms: u64) -> Result<()> {
        aggregates::set_flagged(&self.conn, query_id, timestamp_ms)?;
        tracing::warn!(query_id = %query_id_hex(query_id), timestamp_ms, "aggregate flagged");
        self.emit(OracleEvent::AggregateFlagged {
            query_id: query_id_hex(query_id),
            timestamp_ms,
        });
        Ok(())
    }
}
