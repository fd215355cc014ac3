//! In-memory collaborators.
//!
//! Stand-ins for the staking, registry, bank and bridge modules, used by
//! unit tests, the integration tests and the `tally-sim` binary. State sits
//! behind `parking_lot` mutexes so the handles can be shared with the keeper
//! and inspected afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::U256;
use parking_lot::Mutex;
use tally_types::abi::{self, AbiToken};
use tally_types::query_data::{self, TRB_BRIDGE_QUERY_TYPE};
use tally_types::registry::AbiComponent;
use tally_types::{AccAddress, DataSpec, QueryId};

use crate::expected_keepers::{
    BankKeeper, BridgeKeeper, Delegation, RegistryKeeper, ReporterKeeper, ReporterStake,
    RewardDestination,
};
use crate::keeper::{Collaborators, Keeper, KeeperConfig};
use crate::{OracleError, Result};

/// Registry backed by a map of query type to spec.
#[derive(Default)]
pub struct MockRegistry {
    specs: Mutex<HashMap<String, DataSpec>>,
}

impl MockRegistry {
    /// A registry with `SpotPrice` (median), `StringQuery` (mode) and
    /// `TRBBridge` (median, 2000-block window) registered.
    pub fn with_defaults() -> Self {
        let registry = Self::default();
        registry.register(DataSpec {
            query_type: "SpotPrice".into(),
            response_value_type: "uint256".into(),
            abi_components: vec![
                AbiComponent::new("asset", "string"),
                AbiComponent::new("currency", "string"),
            ],
            aggregation_method: "weighted-median".into(),
            report_block_window: 2,
        });
        registry.register(DataSpec {
            query_type: "StringQuery".into(),
            response_value_type: "string".into(),
            abi_components: vec![AbiComponent::new("text", "string")],
            aggregation_method: "weighted-mode".into(),
            report_block_window: 2,
        });
        registry.register(DataSpec {
            query_type: TRB_BRIDGE_QUERY_TYPE.into(),
            response_value_type: "address,string,uint256,uint256".into(),
            abi_components: vec![
                AbiComponent::new("toLayer", "bool"),
                AbiComponent::new("depositId", "uint256"),
            ],
            aggregation_method: "weighted-mode".into(),
            report_block_window: 2000,
        });
        registry
    }

    pub fn register(&self, spec: DataSpec) {
        self.specs.lock().insert(spec.query_type.clone(), spec);
    }
}

impl RegistryKeeper for MockRegistry {
    fn get_spec(&self, query_type: &str) -> Result<DataSpec> {
        self.specs
            .lock()
            .get(query_type)
            .cloned()
            .ok_or_else(|| OracleError::DataSpecNotFound(query_type.to_string()))
    }
}

/// A reward credited through [`ReporterKeeper::allocate_reward`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatedReward {
    pub reporter: AccAddress,
    pub amount: u128,
    pub destination: RewardDestination,
}

/// Staking module stand-in.
#[derive(Default)]
pub struct MockReporters {
    stakes: Mutex<HashMap<AccAddress, ReporterStake>>,
    jailed: Mutex<HashSet<AccAddress>>,
    unreadable: Mutex<HashSet<AccAddress>>,
    rewards: Mutex<Vec<AllocatedReward>>,
    snapshots: Mutex<Vec<(AccAddress, QueryId, u128)>>,
}

impl MockReporters {
    /// Give a reporter a self-delegated stake.
    pub fn set_stake(&self, reporter: &AccAddress, amount: u128) {
        self.stakes.lock().insert(
            reporter.clone(),
            ReporterStake {
                amount,
                delegations: vec![Delegation {
                    delegator: reporter.clone(),
                    amount,
                }],
            },
        );
    }

    pub fn jail(&self, reporter: &AccAddress) {
        self.jailed.lock().insert(reporter.clone());
    }

    /// Make stake reads for a reporter fail.
    pub fn make_unreadable(&self, reporter: &AccAddress) {
        self.unreadable.lock().insert(reporter.clone());
    }

    /// Every reward credited so far.
    pub fn rewards(&self) -> Vec<AllocatedReward> {
        self.rewards.lock().clone()
    }

    /// Sum of rewards credited to each reporter.
    pub fn reward_totals(&self) -> BTreeMap<AccAddress, u128> {
        let mut totals = BTreeMap::new();
        for r in self.rewards.lock().iter() {
            *totals.entry(r.reporter.clone()).or_insert(0) += r.amount;
        }
        totals
    }

    /// Stake snapshots recorded per report.
    pub fn snapshots(&self) -> Vec<(AccAddress, QueryId, u128)> {
        self.snapshots.lock().clone()
    }
}

impl ReporterKeeper for MockReporters {
    fn reporter_stake(&self, reporter: &AccAddress) -> Result<ReporterStake> {
        if self.unreadable.lock().contains(reporter) {
            return Err(OracleError::Keeper {
                keeper: "reporter",
                reason: format!("stake of {reporter} unavailable"),
            });
        }
        Ok(self.stakes.lock().get(reporter).cloned().unwrap_or_default())
    }

    fn is_jailed(&self, reporter: &AccAddress) -> Result<bool> {
        Ok(self.jailed.lock().contains(reporter))
    }

    fn set_reporter_stake_by_query_id(
        &self,
        reporter: &AccAddress,
        stake: &ReporterStake,
        query_id: &QueryId,
    ) -> Result<()> {
        self.snapshots
            .lock()
            .push((reporter.clone(), *query_id, stake.amount));
        Ok(())
    }

    fn allocate_reward(
        &self,
        reporter: &AccAddress,
        amount: u128,
        destination: RewardDestination,
    ) -> Result<()> {
        self.rewards.lock().push(AllocatedReward {
            reporter: reporter.clone(),
            amount,
            destination,
        });
        Ok(())
    }
}

/// Bank stand-in with account and module balances in one map.
#[derive(Default)]
pub struct MockBank {
    balances: Mutex<HashMap<String, u128>>,
    burned: Mutex<u128>,
    minted: Mutex<u128>,
}

impl MockBank {
    pub fn fund_account(&self, addr: &AccAddress, amount: u128) {
        *self.balances.lock().entry(addr.to_string()).or_insert(0) += amount;
    }

    pub fn fund_module(&self, module: &str, amount: u128) {
        *self.balances.lock().entry(module.to_string()).or_insert(0) += amount;
    }

    pub fn balance(&self, holder: &str) -> u128 {
        self.balances.lock().get(holder).copied().unwrap_or(0)
    }

    pub fn burned(&self) -> u128 {
        *self.burned.lock()
    }

    pub fn minted(&self) -> u128 {
        *self.minted.lock()
    }

    fn transfer(&self, from: &str, to: &str, amount: u128) -> Result<()> {
        let mut balances = self.balances.lock();
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(OracleError::Keeper {
                keeper: "bank",
                reason: format!("insufficient funds in {from}: {available} < {amount}"),
            });
        }
        balances.insert(from.to_string(), available - amount);
        *balances.entry(to.to_string()).or_insert(0) += amount;
        Ok(())
    }
}

impl BankKeeper for MockBank {
    fn send_coins_from_account_to_module(
        &self,
        from: &AccAddress,
        module: &str,
        amount: u128,
    ) -> Result<()> {
        self.transfer(from.as_str(), module, amount)
    }

    fn send_coins_from_module_to_module(&self, from: &str, to: &str, amount: u128) -> Result<()> {
        self.transfer(from, to, amount)
    }

    fn mint_coins(&self, module: &str, amount: u128) -> Result<()> {
        self.fund_module(module, amount);
        *self.minted.lock() += amount;
        Ok(())
    }

    fn burn_coins(&self, module: &str, amount: u128) -> Result<()> {
        let mut balances = self.balances.lock();
        let available = balances.get(module).copied().unwrap_or(0);
        if available < amount {
            return Err(OracleError::Keeper {
                keeper: "bank",
                reason: format!("cannot burn {amount} from {module}"),
            });
        }
        balances.insert(module.to_string(), available - amount);
        *self.burned.lock() += amount;
        Ok(())
    }

    fn module_balance(&self, module: &str) -> Result<u128> {
        Ok(self.balance(module))
    }

    fn account_balance(&self, account: &AccAddress) -> Result<u128> {
        Ok(self.balance(account.as_str()))
    }
}

/// Bridge stand-in tracking claimed deposit ids.
#[derive(Default)]
pub struct MockBridge {
    claimed: Mutex<HashSet<U256>>,
}

impl MockBridge {
    pub fn claim(&self, deposit_id: u64) {
        self.claimed.lock().insert(U256::from(deposit_id));
    }
}

impl BridgeKeeper for MockBridge {
    fn deposit_claimed(&self, deposit_id: U256) -> Result<bool> {
        Ok(self.claimed.lock().contains(&deposit_id))
    }
}

/// A full set of in-memory collaborators.
#[derive(Clone)]
pub struct MockEnv {
    pub registry: Arc<MockRegistry>,
    pub reporters: Arc<MockReporters>,
    pub bank: Arc<MockBank>,
    pub bridge: Arc<MockBridge>,
}

impl Default for MockEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEnv {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(MockRegistry::with_defaults()),
            reporters: Arc::new(MockReporters::default()),
            bank: Arc::new(MockBank::default()),
            bridge: Arc::new(MockBridge::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            registry: self.registry.clone(),
            reporters: self.reporters.clone(),
            bank: self.bank.clone(),
            bridge: self.bridge.clone(),
        }
    }

    /// Deterministic test address derived from `n`.
    pub fn address(n: u8) -> AccAddress {
        AccAddress::from_bytes(tally_types::address::DEFAULT_PREFIX, &[n; 20])
            .unwrap_or_else(|_| unreachable!("20-byte payload under the default prefix"))
    }

    /// The governance authority used by [`MockEnv::keeper`].
    pub fn authority() -> AccAddress {
        Self::address(0xAA)
    }

    /// A keeper over a fresh in-memory store.
    ///
    /// # Panics
    ///
    /// If the in-memory database cannot be opened.
    #[allow(clippy::panic)]
    pub fn keeper(&self) -> Keeper {
        let conn = tally_db::open_memory()
            .unwrap_or_else(|e| panic!("in-memory oracle store: {e}"));
        Keeper::new(conn, KeeperConfig::new(Self::authority()), self.collaborators())
    }

    /// `SpotPrice(asset, usd)` query data.
    pub fn spot_price(&self, asset: &str) -> Vec<u8> {
        let params = abi::encode(&[
            AbiToken::String(asset.to_string()),
            AbiToken::String("usd".into()),
        ]);
        query_data::encode("SpotPrice", &params)
    }

    /// `StringQuery(text)` query data.
    pub fn string_query(&self, text: &str) -> Vec<u8> {
        let params = abi::encode(&[AbiToken::String(text.to_string())]);
        query_data::encode("StringQuery", &params)
    }

    /// Register a reporter with stake and return its address.
    pub fn staked_reporter(&self, n: u8, stake: u128) -> AccAddress {
        let addr = Self::address(n);
        self.reporters.set_stake(&addr, stake);
        addr
    }
}

/// Hex of an ABI `uint256` value, the shape `SpotPrice` reports take.
pub fn uint_value(v: u64) -> String {
    hex::encode(abi::encode(&[AbiToken::Uint(U256::from(v))]))
}

/// Hex of an ABI `string` value, the shape `StringQuery` reports take.
pub fn string_value(s: &str) -> String {
    hex::encode(abi::encode(&[AbiToken::String(s.to_string())]))
}
