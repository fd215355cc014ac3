//! Operation units and deferred collaborator writes.
//!
//! Every public operation runs as one unit: a store savepoint plus a mark in
//! the event buffer and in the queue of collaborator writes. Bank movements,
//! reward credits and stake snapshots are queued while the unit runs and are
//! handed to the collaborators only after the outermost unit has committed.
//! A unit that fails drops its queued writes together with its store writes
//! and events, so a rejected message never moves funds.
//!
//! Balance reads made inside a unit see the movements queued before them.

use tally_types::{AccAddress, QueryId};

use crate::expected_keepers::{BankKeeper, ReporterKeeper, ReporterStake, RewardDestination};
use crate::keeper::Keeper;
use crate::{OracleError, Result};

/// A collaborator write waiting for its unit to commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Effect {
    AccountToModule {
        from: AccAddress,
        module: String,
        amount: u128,
    },
    ModuleToModule {
        from: String,
        to: String,
        amount: u128,
    },
    Mint {
        module: String,
        amount: u128,
    },
    Burn {
        module: String,
        amount: u128,
    },
    Reward {
        reporter: AccAddress,
        amount: u128,
        destination: RewardDestination,
    },
    StakeSnapshot {
        reporter: AccAddress,
        stake: ReporterStake,
        query_id: QueryId,
    },
}

impl Effect {
    /// `(credit, debit)` this write applies to `holder`.
    fn movement(&self, holder: &str) -> (u128, u128) {
        let side = |matches: bool, amount: u128| if matches { amount } else { 0 };
        match self {
            Self::AccountToModule {
                from,
                module,
                amount,
            } => (side(module == holder, *amount), side(from.as_str() == holder, *amount)),
            Self::ModuleToModule { from, to, amount } => {
                (side(to == holder, *amount), side(from == holder, *amount))
            }
            Self::Mint { module, amount } => (side(module == holder, *amount), 0),
            Self::Burn { module, amount } => (0, side(module == holder, *amount)),
            Self::Reward { .. } | Self::StakeSnapshot { .. } => (0, 0),
        }
    }

    fn apply(&self, bank: &dyn BankKeeper, reporters: &dyn ReporterKeeper) -> Result<()> {
        match self {
            Self::AccountToModule {
                from,
                module,
                amount,
            } => bank.send_coins_from_account_to_module(from, module, *amount),
            Self::ModuleToModule { from, to, amount } => {
                bank.send_coins_from_module_to_module(from, to, *amount)
            }
            Self::Mint { module, amount } => bank.mint_coins(module, *amount),
            Self::Burn { module, amount } => bank.burn_coins(module, *amount),
            Self::Reward {
                reporter,
                amount,
                destination,
            } => reporters.allocate_reward(reporter, *amount, *destination),
            Self::StakeSnapshot {
                reporter,
                stake,
                query_id,
            } => reporters.set_reporter_stake_by_query_id(reporter, stake, query_id),
        }
    }
}

/// Buffer positions taken when a unit starts.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Mark {
    events: usize,
    effects: usize,
}

impl Keeper {
    /// Run `f` as one unit named `name`.
    ///
    /// Units nest. Only the outermost one hands queued writes to the
    /// collaborators.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, in which case nothing it did is kept. A
    /// collaborator refusing a queued write after commit is returned as
    /// well; the writes queued behind it are dropped.
    pub(crate) fn atomic<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let mark = self.mark();
        *self.depth.lock() += 1;
        let result = tally_db::with_savepoint(&self.conn, name, f);
        let outermost = {
            let mut depth = self.depth.lock();
            *depth = depth.saturating_sub(1);
            *depth == 0
        };
        match result {
            Ok(value) if outermost => {
                self.apply_effects()?;
                Ok(value)
            }
            Ok(value) => Ok(value),
            Err(e) => {
                self.rollback_to(mark);
                Err(e)
            }
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            events: self.events.lock().len(),
            effects: self.effects.lock().len(),
        }
    }

    fn rollback_to(&self, mark: Mark) {
        self.events.lock().truncate(mark.events);
        self.effects.lock().truncate(mark.effects);
    }

    fn apply_effects(&self) -> Result<()> {
        let effects = std::mem::take(&mut *self.effects.lock());
        for effect in &effects {
            if let Err(e) = effect.apply(self.bank.as_ref(), self.reporters.as_ref()) {
                tracing::error!(?effect, error = %e, "collaborator refused a committed write");
                return Err(e);
            }
        }
        Ok(())
    }

    fn queue(&self, effect: Effect) {
        self.effects.lock().push(effect);
    }

    /// `settled` adjusted by the movements queued for `holder`.
    fn with_queued(&self, holder: &str, settled: u128) -> Result<u128> {
        let (credit, debit) = self
            .effects
            .lock()
            .iter()
            .map(|e| e.movement(holder))
            .try_fold((0u128, 0u128), |(c, d), (ec, ed)| {
                Some((c.checked_add(ec)?, d.checked_add(ed)?))
            })
            .ok_or(OracleError::Overflow)?;
        settled
            .checked_add(credit)
            .and_then(|v| v.checked_sub(debit))
            .ok_or(OracleError::Overflow)
    }

    fn ensure_funds(holder: &str, available: u128, needed: u128) -> Result<()> {
        if available < needed {
            return Err(OracleError::InsufficientFunds {
                holder: holder.to_string(),
                available,
                needed,
            });
        }
        Ok(())
    }

    /// Balance of a module account, queued movements included.
    pub(crate) fn module_balance(&self, module: &str) -> Result<u128> {
        let settled = self.bank.module_balance(module)?;
        self.with_queued(module, settled)
    }

    pub(crate) fn send_from_account(
        &self,
        from: &AccAddress,
        module: &str,
        amount: u128,
    ) -> Result<()> {
        let settled = self.bank.account_balance(from)?;
        Self::ensure_funds(from.as_str(), self.with_queued(from.as_str(), settled)?, amount)?;
        self.queue(Effect::AccountToModule {
            from: from.clone(),
            module: module.to_string(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn send_between_modules(&self, from: &str, to: &str, amount: u128) -> Result<()> {
        Self::ensure_funds(from, self.module_balance(from)?, amount)?;
        self.queue(Effect::ModuleToModule {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn mint(&self, module: &str, amount: u128) {
        self.queue(Effect::Mint {
            module: module.to_string(),
            amount,
        });
    }

    pub(crate) fn burn(&self, module: &str, amount: u128) -> Result<()> {
        Self::ensure_funds(module, self.module_balance(module)?, amount)?;
        self.queue(Effect::Burn {
            module: module.to_string(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn credit_reward(
        &self,
        reporter: &AccAddress,
        amount: u128,
        destination: RewardDestination,
    ) {
        self.queue(Effect::Reward {
            reporter: reporter.clone(),
            amount,
            destination,
        });
    }

    pub(crate) fn queue_stake_snapshot(
        &self,
        reporter: &AccAddress,
        stake: &ReporterStake,
        query_id: &QueryId,
    ) {
        self.queue(Effect::StakeSnapshot {
            reporter: reporter.clone(),
            stake: stake.clone(),
            query_id: *query_id,
        });
    }
}
