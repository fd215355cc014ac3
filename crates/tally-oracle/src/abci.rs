//! Begin/end block hooks.
//!
//! [`Keeper::begin_block`] runs before any message of the block: it mints
//! time-based rewards and rotates the cycle list. [`Keeper::end_block`]
//! runs after the last message and closes every expired round that has
//! reports.

use tally_db::queries::{cyclelist, query_meta};
use tally_types::Aggregate;

use crate::keeper::{BlockContext, Keeper};
use crate::Result;

impl Keeper {
    /// Start-of-block work. All or nothing.
    pub fn begin_block(&self, ctx: &BlockContext) -> Result<()> {
        self.atomic("begin_block", || {
            self.mint_time_based_rewards(ctx)?;
            if cyclelist::len(&self.conn)? > 0 {
                self.rotate_queries(ctx)?;
            }
            Ok(())
        })
    }

    /// Aggregate every expired round with reports.
    ///
    /// Returns the aggregates created, in round order. Payouts reach the
    /// bank and reporter modules only once every round has closed.
    pub fn end_block(&self, ctx: &BlockContext) -> Result<Vec<Aggregate>> {
        let created = self.atomic("end_block", || {
            let expired = query_meta::expired_with_reports(&self.conn, ctx.height)?;
            let mut created = Vec::with_capacity(expired.len());
            for meta in &expired {
                created.push(self.close_round(ctx, meta)?);
            }
            Ok(created)
        })?;
        if !created.is_empty() {
            tracing::debug!(height = ctx.height, aggregates = created.len(), "end block");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{uint_value, MockEnv};
    use tally_types::{query_data, OracleEvent};

    #[test]
    fn test_begin_block_without_cyclelist_only_mints() {
        let env = MockEnv::new();
        let keeper = env.keeper();
        keeper.begin_block(&BlockContext::new(1, 1_000)).expect("first");
        keeper.begin_block(&BlockContext::new(2, 2_000)).expect("second");
        assert!(env.bank.minted() > 0);
        assert!(!keeper
            .take_events()
            .iter()
            .any(|e| matches!(e, OracleEvent::RotatedQueries { .. })));
    }

    #[test]
    fn test_block_lifecycle_aggregates_cycle_round() {
        let env = MockEnv::new();
        let keeper = env.keeper();
        let reporter = env.staked_reporter(1, 5_000_000);
        let data = env.spot_price("eth");
        keeper.set_cyclelist(&[data.clone()]).expect("cyclelist");

        keeper.begin_block(&BlockContext::new(1, 1_000)).expect("begin");
        keeper
            .submit_value(
                &BlockContext::new(1, 1_000),
                reporter.as_str(),
                &data,
                &uint_value(42),
                None,
            )
            .expect("report");

        // Open through height 3.
        assert!(keeper.end_block(&BlockContext::new(3, 3_000)).expect("end").is_empty());
        let created = keeper.end_block(&BlockContext::new(4, 4_000)).expect("end");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].aggregate_value, uint_value(42));
        assert_eq!(created[0].aggregate_power, 5);
        assert!(keeper
            .current_query(&query_data::query_id(&data))
            .expect("meta")
            .is_none());
    }

    #[test]
    fn test_end_block_skips_unreported_rounds() {
        let env = MockEnv::new();
        let keeper = env.keeper();
        keeper.set_cyclelist(&[env.spot_price("eth")]).expect("cyclelist");
        keeper.begin_block(&BlockContext::new(1, 1_000)).expect("begin");
        assert!(keeper.end_block(&BlockContext::new(50, 50_000)).expect("end").is_empty());
    }
}
