//! Module parameters.
//!
//! Parameters are persisted by the store and loadable from TOML. Every
//! field has a default so a partial table is valid input.

use serde::{Deserialize, Serialize};

use crate::{Result, TypesError};

/// Default minimum stake required to report.
pub const DEFAULT_MIN_STAKE_AMOUNT: u64 = 1_000_000;

/// Default divisor turning stake into reporting power.
pub const DEFAULT_POWER_REDUCTION: u64 = 1_000_000;

/// Default maximum query-data size (512 KiB).
pub const DEFAULT_QUERY_DATA_LIMIT: u64 = 512 * 1024;

/// Default maximum number of items in a batch submission.
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 20;

/// Default blocks a synthetic bridge-deposit round stays open.
pub const DEFAULT_BRIDGE_DEPOSIT_WINDOW: u64 = 2000;

/// Default daily time-based reward mint.
pub const DEFAULT_DAILY_MINT_RATE: u64 = 146_940_000;

/// Oracle module parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Minimum stake a reporter needs to submit.
    #[serde(default = "default_min_stake_amount")]
    pub min_stake_amount: u64,
    /// Stake units per unit of reporting power.
    #[serde(default = "default_power_reduction")]
    pub power_reduction: u64,
    /// Cycle-list wraps between liveness distributions.
    #[serde(default = "default_liveness_cycles")]
    pub liveness_cycles: u64,
    /// Maximum query-data size in bytes.
    #[serde(default = "default_query_data_limit")]
    pub query_data_limit: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u32,
    /// Percentage of every tip that is burned.
    #[serde(default = "default_tip_burn_percent")]
    pub tip_burn_percent: u8,
    #[serde(default = "default_bridge_deposit_window")]
    pub bridge_deposit_window: u64,
    /// Blocks after expiration during which a commitment may be revealed.
    #[serde(default = "default_reveal_offset")]
    pub reveal_offset: u64,
    /// Time-based rewards minted per day.
    #[serde(default = "default_daily_mint_rate")]
    pub daily_mint_rate: u64,
    /// Extra rewards released per day. Zero means "use the mint rate".
    #[serde(default)]
    pub daily_extra_rewards: u64,
}

fn default_min_stake_amount() -> u64 {
    DEFAULT_MIN_STAKE_AMOUNT
}

fn default_power_reduction() -> u64 {
    DEFAULT_POWER_REDUCTION
}

fn default_liveness_cycles() -> u64 {
    1
}

fn default_query_data_limit() -> u64 {
    DEFAULT_QUERY_DATA_LIMIT
}

fn default_max_batch_size() -> u32 {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_tip_burn_percent() -> u8 {
    2
}

fn default_bridge_deposit_window() -> u64 {
    DEFAULT_BRIDGE_DEPOSIT_WINDOW
}

fn default_reveal_offset() -> u64 {
    3
}

fn default_daily_mint_rate() -> u64 {
    DEFAULT_DAILY_MINT_RATE
}

impl Default for Params {
    fn default() -> Self {
        Self {
            min_stake_amount: default_min_stake_amount(),
            power_reduction: default_power_reduction(),
            liveness_cycles: default_liveness_cycles(),
            query_data_limit: default_query_data_limit(),
            max_batch_size: default_max_batch_size(),
            tip_burn_percent: default_tip_burn_percent(),
            bridge_deposit_window: default_bridge_deposit_window(),
            reveal_offset: default_reveal_offset(),
            daily_mint_rate: default_daily_mint_rate(),
            daily_extra_rewards: 0,
        }
    }
}

impl Params {
    /// Reject parameter sets that would divide by zero or burn more than the tip.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidParams`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str| Err(TypesError::InvalidParams(field.to_string()));
        if self.power_reduction == 0 {
            return invalid("power_reduction must be positive");
        }
        if self.liveness_cycles == 0 {
            return invalid("liveness_cycles must be positive");
        }
        if self.query_data_limit == 0 {
            return invalid("query_data_limit must be positive");
        }
        if self.max_batch_size == 0 {
            return invalid("max_batch_size must be positive");
        }
        if self.tip_burn_percent > 100 {
            return invalid("tip_burn_percent must be at most 100");
        }
        Ok(())
    }

    /// Effective daily extra-rewards rate.
    pub fn extra_rewards_rate(&self) -> u64 {
        if self.daily_extra_rewards == 0 {
            self.daily_mint_rate
        } else {
            self.daily_extra_rewards
        }
    }
}
