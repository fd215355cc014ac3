//! Interfaces the engine needs from the rest of the chain.
//!
//! Staking, the data-spec registry, the bank and the token bridge are owned
//! by other modules. The keeper holds them as trait objects so tests and the
//! simulator can supply the in-memory versions in [`crate::mock`].

use alloy_primitives::U256;
use tally_types::{AccAddress, DataSpec, QueryId};

use crate::Result;

/// One delegation backing a reporter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delegation {
    pub delegator: AccAddress,
    pub amount: u128,
}

/// A reporter's stake and its breakdown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReporterStake {
    /// Total stake, the sum of all delegations.
    pub amount: u128,
    pub delegations: Vec<Delegation>,
}

/// Where an allocated reward ends up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewardDestination {
    /// Compounds into the reporter's stake.
    Stake,
    /// Held in escrow, claimable as liquid tokens.
    Escrow,
}

impl RewardDestination {
    /// Module pool that receives the funds for this destination.
    pub fn pool(&self) -> &'static str {
        match self {
            Self::Stake => tally_types::BONDED_POOL,
            Self::Escrow => tally_types::TIPS_ESCROW_POOL,
        }
    }
}

/// Stake/power provider.
pub trait ReporterKeeper {
    /// Current stake of a reporter.
    ///
    /// # Errors
    ///
    /// Any error means the stake could not be read.
    fn reporter_stake(&self, reporter: &AccAddress) -> Result<ReporterStake>;

    /// Whether the reporter is jailed.
    fn is_jailed(&self, reporter: &AccAddress) -> Result<bool>;

    /// Snapshot the stake used for a report on `query_id`.
    fn set_reporter_stake_by_query_id(
        &self,
        reporter: &AccAddress,
        stake: &ReporterStake,
        query_id: &QueryId,
    ) -> Result<()>;

    /// Credit a reward to a reporter.
    fn allocate_reward(
        &self,
        reporter: &AccAddress,
        amount: u128,
        destination: RewardDestination,
    ) -> Result<()>;
}

/// Data-spec resolver.
pub trait RegistryKeeper {
    /// The data spec registered for a query type.
    ///
    /// # Errors
    ///
    /// [`crate::OracleError::DataSpecNotFound`] if none is registered.
    fn get_spec(&self, query_type: &str) -> Result<DataSpec>;
}

/// Bank/transfer provider. Amounts are in the bond denom.
///
/// The keeper only calls the writing methods after the operation that
/// queued them has committed, with amounts it has already checked against
/// the balances.
pub trait BankKeeper {
    fn send_coins_from_account_to_module(
        &self,
        from: &AccAddress,
        module: &str,
        amount: u128,
    ) -> Result<()>;

    fn send_coins_from_module_to_module(&self, from: &str, to: &str, amount: u128) -> Result<()>;

    fn mint_coins(&self, module: &str, amount: u128) -> Result<()>;

    fn burn_coins(&self, module: &str, amount: u128) -> Result<()>;

    /// Balance of a module account.
    fn module_balance(&self, module: &str) -> Result<u128>;

    /// Spendable balance of an account.
    fn account_balance(&self, account: &AccAddress) -> Result<u128>;
}

/// Token-bridge deposit status.
pub trait BridgeKeeper {
    /// Whether a deposit has already been claimed on this chain.
    fn deposit_claimed(&self, deposit_id: U256) -> Result<bool>;
}
