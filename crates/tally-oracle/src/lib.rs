//! # tally-oracle
//!
//! Oracle aggregation and incentive engine.
//!
//! Staked reporters submit values for registered queries; each round of a
//! query is closed into exactly one [`Aggregate`](tally_types::Aggregate)
//! by a deterministic strategy (weighted median or weighted mode), and
//! tips plus minted time-based rewards are split among reporters.
//!
//! Everything here is a synchronous state transition over the block's
//! store. A message either commits all its writes or none of them; see
//! [`Keeper::deliver`]. Collaborator writes are held back until the
//! outermost operation commits.
//!
//! ## Modules
//!
//! - [`keeper`] — Keeper, block context and round lifecycle helpers
//! - `pending` — Operation units and deferred collaborator writes
//! - [`expected_keepers`] — Collaborator interfaces (stake, registry, bank, bridge)
//! - [`cycle_list`] — Cycle-list rotation
//! - [`submit`] — Report intake and the direct-reveal rules
//! - [`token_bridge`] — Bridge deposit rounds and withdrawal blocking
//! - [`commit`] — Commit-reveal reporting
//! - [`no_stake`] — Permissionless, unweighted reports
//! - [`tip`] — Tipping
//! - [`aggregate`] — Aggregation strategies and round closing
//! - [`rewards`] — Proportional reward allocation
//! - [`liveness`] — Liveness tracking and periodic distribution
//! - [`tbr`] — Time-based reward minting
//! - [`abci`] — Begin/end block hooks
//! - [`msg_server`] — Message handlers
//! - [`query`] — Read-only query surface
//! - [`mock`] — In-memory collaborators for tests and simulation

pub mod abci;
pub mod aggregate;
pub mod commit;
pub mod cycle_list;
pub mod expected_keepers;
pub mod keeper;
pub mod liveness;
pub mod mock;
pub mod msg_server;
pub mod no_stake;
mod pending;
pub mod query;
pub mod rewards;
pub mod submit;
pub mod tbr;
pub mod tip;
pub mod token_bridge;

pub use keeper::{BlockContext, Collaborators, Keeper, KeeperConfig};
pub use msg_server::{OracleMsg, OracleMsgResponse};
pub use query::Querier;

use tally_db::DbError;
use tally_types::TypesError;

/// Error types for oracle operations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    // --- validation ---
    /// Address is not valid bech32 or has the wrong prefix.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Query data is empty.
    #[error("query data cannot be empty")]
    EmptyQueryData,

    /// Query data exceeds the configured limit.
    #[error("query data too large: {size} bytes exceeds limit of {limit}")]
    QueryDataTooLarge {
        /// Submitted size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Reported value is empty.
    #[error("value cannot be empty")]
    EmptyValue,

    /// Reported value does not decode under the data spec.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Query data does not decode, or its params do not match the data spec.
    #[error("invalid query data: {0}")]
    InvalidQueryData(String),

    /// Tip amount is zero.
    #[error("tip amount must be positive")]
    ZeroTip,

    /// Batch has more items than allowed.
    #[error("too many reports in batch, max is {max}")]
    TooManyReports {
        /// Maximum batch size.
        max: u32,
    },

    /// A parameter update would produce an invalid parameter set.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    // --- eligibility ---
    /// Reporter stake is below the minimum.
    #[error("reporter has {stake}, required amount is {min}")]
    NotEnoughStake {
        /// Reporter's stake.
        stake: u128,
        /// Minimum stake.
        min: u128,
    },

    /// Reporter is jailed and cannot commit.
    #[error("reporter {0} is jailed")]
    ReporterJailed(String),

    /// Reporter already reported (or committed) for this round.
    #[error("reporter {reporter} already reported for round {meta_id}")]
    AlreadyReported {
        /// Reporter address.
        reporter: String,
        /// Round id.
        meta_id: u64,
    },

    /// A no-stake report already exists at this timestamp.
    #[error("report for this queryId already exists at this height, please resubmit next block")]
    NoStakeReportExists,

    /// Untipped query that is not the in-turn cycle-list query.
    #[error("query doesn't have tips and is not in cycle")]
    NoTipsNotInCycle,

    /// Tipped round expired and the query is not in turn.
    #[error("tip submission window expired")]
    SubmissionWindowExpired,

    /// Attempted report on a bridge withdrawal.
    #[error("cannot report token bridge withdrawal")]
    BridgeWithdrawalReport,

    /// Bridge deposit was already claimed.
    #[error("bridge deposit {0} already claimed")]
    DepositAlreadyClaimed(String),

    /// No commitment for the reveal.
    #[error("no commitment found for reporter {reporter} in round {meta_id}")]
    NoCommitment {
        /// Reporter address.
        reporter: String,
        /// Round id.
        meta_id: u64,
    },

    /// Revealed value and salt do not hash to the commitment.
    #[error("revealed value does not match commitment")]
    CommitmentMismatch,

    /// Reveal arrived after the reveal window.
    #[error("missed reveal window: height {height} > {deadline}")]
    MissedRevealWindow {
        /// Current height.
        height: u64,
        /// Last height a reveal was accepted.
        deadline: u64,
    },

    // --- authority ---
    /// Governance message signed by the wrong authority.
    #[error("invalid authority; expected {expected}, got {got}")]
    InvalidSigner {
        /// Configured authority.
        expected: String,
        /// Message signer.
        got: String,
    },

    // --- not found ---
    /// A stored entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// No aggregate exists for the requested query/timestamp.
    #[error("no aggregate: {0}")]
    NoAggregate(String),

    /// The registry has no data spec for the query type.
    #[error("data spec not found for query type {0}")]
    DataSpecNotFound(String),

    // --- invariants ---
    /// Aggregation was invoked on an empty round.
    #[error("no reports to aggregate")]
    NoReportsToAggregate,

    /// The cycle list is empty.
    #[error("cycle list is empty")]
    EmptyCyclelist,

    /// A data spec names an aggregation method with no strategy.
    #[error("unknown aggregation method {0}")]
    UnknownAggregationMethod(String),

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,

    // --- collaborators and storage ---
    /// An account or module cannot cover a transfer or burn.
    #[error("insufficient funds in {holder}: {available} < {needed}")]
    InsufficientFunds {
        /// Account address or module name.
        holder: String,
        /// Balance including pending movements.
        available: u128,
        /// Amount requested.
        needed: u128,
    },

    /// A collaborator keeper failed.
    #[error("{keeper} keeper: {reason}")]
    Keeper {
        /// Which collaborator.
        keeper: &'static str,
        /// Failure reason.
        reason: String,
    },

    /// Storage failure.
    #[error("database error: {0}")]
    Db(DbError),
}

impl OracleError {
    /// Whether the error means the store itself failed, as opposed to the
    /// message being rejected.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

impl From<DbError> for OracleError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => Self::NotFound(what),
            other => Self::Db(other),
        }
    }
}

impl From<TypesError> for OracleError {
    fn from(e: TypesError) -> Self {
        match e {
            TypesError::InvalidAddress(s) => Self::InvalidAddress(s),
            TypesError::InvalidQueryData(s) => Self::InvalidQueryData(s),
            TypesError::InvalidValue(s) => Self::InvalidValue(s),
            TypesError::UnsupportedAbiType(s) => {
                Self::InvalidValue(format!("unsupported type {s}"))
            }
            TypesError::InvalidDecimal(s) => Self::InvalidValue(s),
            TypesError::InvalidParams(s) => Self::InvalidParams(s),
        }
    }
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
