//! # tally-types
//!
//! Shared domain types for the tally oracle engine.
//!
//! Everything in this crate is plain data plus the pure codecs that every
//! validator must evaluate identically: bech32 account addresses, the
//! 18-decimal fixed-point [`Dec`], the ABI query-data codec and the
//! records persisted by `tally-db`.
//!
//! ## Modules
//!
//! - [`abi`] — Minimal Solidity ABI tuple encoder/decoder
//! - [`address`] — Bech32 account addresses
//! - [`dec`] — Fixed-point decimal arithmetic
//! - [`events`] — Typed chain events
//! - [`oracle`] — Query rounds, reports, aggregates and liveness records
//! - [`params`] — Module parameters
//! - [`query_data`] — Query-data encoding and query ids
//! - [`registry`] — Data specs and value validation

pub mod abi;
pub mod address;
pub mod dec;
pub mod events;
pub mod oracle;
pub mod params;
pub mod query_data;
pub mod registry;

pub use address::AccAddress;
pub use dec::Dec;
pub use events::OracleEvent;
pub use oracle::{
    Aggregate, AggregateReporter, Commitment, LivenessRecord, MicroReport, NoStakeMicroReport,
    QueryMeta, ReporterLiveness,
};
pub use params::Params;
pub use registry::{AggregationMethod, DataSpec};

/// keccak256 of the query data; the primary key of every query.
pub type QueryId = [u8; 32];

/// Staking denomination.
pub const BOND_DENOM: &str = "loya";

/// Module account holding tips until their round closes.
pub const ORACLE_MODULE: &str = "oracle";

/// Pool that accumulates minted time-based rewards.
pub const TIME_BASED_REWARDS_POOL: &str = "time_based_rewards";

/// Escrow pool that pays out liquid tip rewards and compounding liveness rewards.
pub const TIPS_ESCROW_POOL: &str = "tips_escrow_pool";

/// Pool funded out-of-band that tops up time-based rewards.
pub const EXTRA_REWARDS_POOL: &str = "extra_rewards_pool";

/// Pool backing bonded stake; compounding rewards land here.
pub const BONDED_POOL: &str = "bonded_tokens_pool";

/// Fee collector receiving a quarter of every extra-rewards release.
pub const FEE_COLLECTOR: &str = "fee_collector";

/// Milliseconds in one day, the denominator of every daily rate.
pub const MS_PER_DAY: u64 = 86_400_000;

/// Error types for the shared codecs.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// The string is not a valid bech32 account address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Query data could not be decoded as `(string, bytes)`.
    #[error("invalid query data: {0}")]
    InvalidQueryData(String),

    /// A reported value does not decode under its declared type.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// An ABI type string is not supported.
    #[error("unsupported abi type: {0}")]
    UnsupportedAbiType(String),

    /// A decimal string could not be parsed.
    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),

    /// A parameter set failed validation.
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

/// Convenience result type for shared codecs.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Lowercase hex of a query id, as used in events and logs.
pub fn query_id_hex(query_id: &QueryId) -> String {
    hex::encode(query_id)
}

/// Strip an optional `0x`/`0X` prefix from a hex string.
pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}
