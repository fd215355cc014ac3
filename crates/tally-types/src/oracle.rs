//! Query rounds, reports, aggregates and liveness records.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::{AccAddress, Dec, QueryId};

/// One open round of a query.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMeta {
    /// Globally unique round id, drawn from the query sequencer.
    pub id: u64,
    /// Per-query round counter, incremented every time a round opens.
    pub round: u64,
    #[serde_as(as = "Hex")]
    pub query_id: QueryId,
    /// Net tip pool for this round.
    pub amount: u128,
    /// Last block height at which reports are accepted.
    pub expiration: u64,
    pub report_buffer_window: u64,
    pub has_revealed_reports: bool,
    #[serde_as(as = "Hex")]
    pub query_data: Vec<u8>,
    pub query_type: String,
    /// Opened by the cycle-list rotation rather than by a tip.
    pub cycle_list: bool,
}

impl QueryMeta {
    /// Whether the round no longer accepts reports at `height`.
    pub fn is_expired(&self, height: u64) -> bool {
        height > self.expiration
    }
}

/// A single reporter's submission for one round.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroReport {
    pub reporter: AccAddress,
    pub power: u64,
    pub query_type: String,
    #[serde_as(as = "Hex")]
    pub query_id: QueryId,
    pub aggregate_method: String,
    /// Hex value without `0x`.
    pub value: String,
    pub timestamp_ms: u64,
    pub cycle_list: bool,
    pub block_number: u64,
    pub meta_id: u64,
}

/// Reporter contribution recorded on an aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReporter {
    pub reporter: AccAddress,
    pub power: u64,
    pub block_number: u64,
}

/// Canonical value produced for one closed round.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde_as(as = "Hex")]
    pub query_id: QueryId,
    pub aggregate_value: String,
    pub aggregate_reporter: AccAddress,
    /// Total power of every report in the round.
    pub aggregate_power: u64,
    /// Power of the selected report.
    pub reporter_power: u64,
    pub standard_deviation: f64,
    pub reporters: Vec<AggregateReporter>,
    pub flagged: bool,
    /// Position of this aggregate in the query's history.
    pub index: u64,
    /// Position of the selected report in the aggregated slice.
    pub aggregate_report_index: u64,
    /// Block height the aggregate was created at.
    pub height: u64,
    /// Highest block number among the aggregated reports.
    pub micro_height: u64,
    pub meta_id: u64,
    pub timestamp_ms: u64,
}

/// A report accepted without a stake check.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoStakeMicroReport {
    pub reporter: AccAddress,
    #[serde_as(as = "Hex")]
    pub query_id: QueryId,
    pub value: String,
    pub timestamp_ms: u64,
    pub block_number: u64,
}

/// Hash commitment for a later reveal.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub reporter: AccAddress,
    #[serde_as(as = "Hex")]
    pub query_id: QueryId,
    pub meta_id: u64,
    /// Hex keccak256 of `value_bytes || salt`.
    pub hash: String,
    pub block_number: u64,
    pub cycle_list: bool,
}

/// Participation accumulated by a reporter during one liveness period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessRecord {
    pub queries_reported: u64,
    pub accumulated_power: u128,
}

/// Reporter-facing liveness summary across the chain's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterLiveness {
    pub reporter_reports: u64,
    pub total_aggregates: u64,
    /// `reporter_reports / total_aggregates * 100`.
    pub percent_liveness: Dec,
    pub last_report_time_ms: Option<u64>,
}
