//! Time-based reward minting.
//!
//! Each block mints the elapsed share of `daily_mint_rate` into the
//! time-based-rewards pool, and releases the same share of the extra rate
//! from the extra-rewards pool while that pool can cover it.

use tally_db::queries::state;
use tally_types::{
    OracleEvent, EXTRA_REWARDS_POOL, FEE_COLLECTOR, MS_PER_DAY, TIME_BASED_REWARDS_POOL,
};

use crate::keeper::{BlockContext, Keeper};
use crate::{OracleError, Result};

/// Amounts moved by one minting step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MintOutcome {
    pub minted: u128,
    /// Extra rewards released, before the fee-collector split.
    pub extra: u128,
}

/// `rate * elapsed_ms / MS_PER_DAY`, truncated.
fn prorate(rate: u64, elapsed_ms: u64) -> Result<u128> {
    u128::from(rate)
        .checked_mul(u128::from(elapsed_ms))
        .map(|v| v / u128::from(MS_PER_DAY))
        .ok_or(OracleError::Overflow)
}

impl Keeper {
    /// Mint and release rewards for the time since the previous block.
    ///
    /// The first call only records the block time.
    pub fn mint_time_based_rewards(&self, ctx: &BlockContext) -> Result<MintOutcome> {
        self.atomic("mint_time_based_rewards", || self.mint_time_based_rewards_inner(ctx))
    }

    fn mint_time_based_rewards_inner(&self, ctx: &BlockContext) -> Result<MintOutcome> {
        let last = state::get_u64(&self.conn, state::LAST_MINT_TIME_MS)?;
        state::set_u64(&self.conn, state::LAST_MINT_TIME_MS, ctx.time_ms)?;
        if last == 0 {
            return Ok(MintOutcome::default());
        }
        let Some(elapsed) = ctx.time_ms.checked_sub(last) else {
            tracing::warn!(last, now = ctx.time_ms, "block time went backwards, skipping mint");
            return Ok(MintOutcome::default());
        };

        let params = self.params()?;
        let mut outcome = MintOutcome {
            minted: prorate(params.daily_mint_rate, elapsed)?,
            extra: 0,
        };
        if outcome.minted > 0 {
            self.mint(TIME_BASED_REWARDS_POOL, outcome.minted);
        }

        let extra = prorate(params.extra_rewards_rate(), elapsed)?;
        if extra > 0 && self.module_balance(EXTRA_REWARDS_POOL)? >= extra {
            let quarter = extra / 4;
            self.send_between_modules(
                EXTRA_REWARDS_POOL,
                TIME_BASED_REWARDS_POOL,
                extra - quarter,
            )?;
            if quarter > 0 {
                self.send_between_modules(EXTRA_REWARDS_POOL, FEE_COLLECTOR, quarter)?;
            }
            outcome.extra = extra;
        }

        if outcome.minted > 0 || outcome.extra > 0 {
            tracing::debug!(
                elapsed,
                minted = outcome.minted,
                extra = outcome.extra,
                "time-based rewards minted"
            );
            self.emit(OracleEvent::TimeBasedRewardsMinted {
                minted: outcome.minted.to_string(),
                extra: outcome.extra.to_string(),
            });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEnv;

    #[test]
    fn test_first_block_only_records_time() {
        let env = MockEnv::new();
        let keeper = env.keeper();
        let outcome = keeper
            .mint_time_based_rewards(&BlockContext::new(1, 1_000))
            .expect("mint");
        assert_eq!(outcome, MintOutcome::default());
        assert_eq!(env.bank.minted(), 0);
        assert_eq!(
            state::get_u64(keeper.connection(), state::LAST_MINT_TIME_MS).expect("time"),
            1_000
        );
    }

    #[test]
    fn test_mints_prorated_share() {
        let env = MockEnv::new();
        let keeper = env.keeper();
        keeper.mint_time_based_rewards(&BlockContext::new(1, 1_000)).expect("first");
        let outcome = keeper
            .mint_time_based_rewards(&BlockContext::new(2, 1_000 + MS_PER_DAY / 2))
            .expect("second");
        assert_eq!(outcome.minted, 73_470_000);
        assert_eq!(outcome.extra, 0);
        assert_eq!(env.bank.balance(TIME_BASED_REWARDS_POOL), 73_470_000);
        assert!(matches!(
            keeper.take_events().as_slice(),
            [OracleEvent::TimeBasedRewardsMinted { .. }]
        ));
    }

    #[test]
    fn test_extra_rewards_split() {
        let env = MockEnv::new();
        env.bank.fund_module(EXTRA_REWARDS_POOL, 1_000);
        let keeper = env.keeper();
        let mut params = keeper.params().expect("params");
        params.daily_mint_rate = 0;
        params.daily_extra_rewards = 800;
        tally_db::queries::params::set(keeper.connection(), &params).expect("set");

        keeper.mint_time_based_rewards(&BlockContext::new(1, 1)).expect("first");
        let outcome = keeper
            .mint_time_based_rewards(&BlockContext::new(2, 1 + MS_PER_DAY))
            .expect("second");
        assert_eq!(outcome.extra, 800);
        assert_eq!(env.bank.balance(TIME_BASED_REWARDS_POOL), 600);
        assert_eq!(env.bank.balance(FEE_COLLECTOR), 200);
        assert_eq!(env.bank.balance(EXTRA_REWARDS_POOL), 200);

        // The pool no longer covers a full day.
        let outcome = keeper
            .mint_time_based_rewards(&BlockContext::new(3, 1 + 2 * MS_PER_DAY))
            .expect("third");
        assert_eq!(outcome.extra, 0);
        assert_eq!(env.bank.balance(EXTRA_REWARDS_POOL), 200);
    }

    #[test]
    fn test_time_going_backwards_skips() {
        let env = MockEnv::new();
        let keeper = env.keeper();
        keeper.mint_time_based_rewards(&BlockContext::new(1, 5_000)).expect("first");
        let outcome = keeper
            .mint_time_based_rewards(&BlockContext::new(2, 4_000))
            .expect("second");
        assert_eq!(outcome, MintOutcome::default());
    }
}
