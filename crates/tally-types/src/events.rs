//! Typed chain events emitted by the oracle module.
//!
//! Events are collected per block by the keeper and drained by the host.
//! Amounts are decimal strings so the JSON form stays lossless.

use serde::{Deserialize, Serialize};

/// All oracle events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleEvent {
    NewReport {
        reporter: String,
        query_id: String,
        value: String,
        meta_id: u64,
        power: u64,
        cycle_list: bool,
        block_number: u64,
    },
    AggregateReport {
        query_id: String,
        value: String,
        aggregate_power: u64,
        micro_report_height: u64,
        timestamp_ms: u64,
        meta_id: u64,
    },
    TipAdded {
        tipper: String,
        query_id: String,
        amount: String,
        burned: String,
    },
    CyclelistUpdated {
        queries: usize,
    },
    RotatedQueries {
        query_id: String,
        index: u64,
        meta_id: u64,
    },
    LivenessRewardsDistributed {
        /// Amount moved out of the time-based-rewards pool.
        total_distributed: String,
        /// Amount credited to reporters, carried dust included.
        allocated: String,
        reporter_count: usize,
        dust: String,
    },
    NoStakeReport {
        reporter: String,
        query_id: String,
        value: String,
        timestamp_ms: u64,
    },
    CommitReport {
        reporter: String,
        query_id: String,
        meta_id: u64,
    },
    TimeBasedRewardsMinted {
        minted: String,
        extra: String,
    },
    AggregateFlagged {
        query_id: String,
        timestamp_ms: u64,
    },
    ParamsUpdated {
        field: String,
        value: String,
    },
}

impl OracleEvent {
    /// The snake_case event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewReport { .. } => "new_report",
            Self::AggregateReport { .. } => "aggregate_report",
            Self::TipAdded { .. } => "tip_added",
            Self::CyclelistUpdated { .. } => "cyclelist_updated",
            Self::RotatedQueries { .. } => "rotated_queries",
            Self::LivenessRewardsDistributed { .. } => "liveness_rewards_distributed",
            Self::NoStakeReport { .. } => "no_stake_report",
            Self::CommitReport { .. } => "commit_report",
            Self::TimeBasedRewardsMinted { .. } => "time_based_rewards_minted",
            Self::AggregateFlagged { .. } => "aggregate_flagged",
            Self::ParamsUpdated { .. } => "params_updated",
        }
    }
}
