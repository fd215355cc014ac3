//! Cycle-list rotation.
//!
//! The cycle list is an ordered set of queries that are always answered.
//! Each block, [`Keeper::rotate_queries`] advances the in-turn pointer and
//! makes sure the in-turn query has an open round flagged as a cycle-list
//! round. A wrap back to index 0 ends one cycle and may trigger a liveness
//! distribution.

use tally_db::queries::{cyclelist, state};
use tally_types::{query_data, query_id_hex, OracleEvent, QueryMeta};

use crate::keeper::{BlockContext, Keeper};
use crate::{OracleError, Result};

impl Keeper {
    /// The whole cycle list in order.
    pub fn cyclelist(&self) -> Result<Vec<Vec<u8>>> {
        Ok(cyclelist::all(&self.conn)?)
    }

    /// Query data of the in-turn query.
    ///
    /// # Errors
    ///
    /// [`OracleError::EmptyCyclelist`] if the list is empty.
    pub fn current_query_in_cycle_list(&self) -> Result<Vec<u8>> {
        let len = cyclelist::len(&self.conn)?;
        if len == 0 {
            return Err(OracleError::EmptyCyclelist);
        }
        let index = state::get_u64(&self.conn, state::CYCLE_INDEX)? % len;
        cyclelist::at(&self.conn, index)?.ok_or(OracleError::EmptyCyclelist)
    }

    /// Query data that will be in turn after the next rotation.
    pub fn next_query_in_cycle_list(&self) -> Result<Vec<u8>> {
        let len = cyclelist::len(&self.conn)?;
        if len == 0 {
            return Err(OracleError::EmptyCyclelist);
        }
        let next = (state::get_u64(&self.conn, state::CYCLE_INDEX)? + 1) % len;
        cyclelist::at(&self.conn, next)?.ok_or(OracleError::EmptyCyclelist)
    }

    /// Whether `data` is the in-turn query. False when the list is empty.
    pub(crate) fn is_in_turn(&self, data: &[u8]) -> Result<bool> {
        match self.current_query_in_cycle_list() {
            Ok(current) => Ok(current == data),
            Err(OracleError::EmptyCyclelist) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Advance the in-turn pointer and open the in-turn round.
    ///
    /// Returns the query data now in turn.
    ///
    /// # Errors
    ///
    /// [`OracleError::EmptyCyclelist`] if the list is empty; nothing is
    /// written in that case.
    pub fn rotate_queries(&self, ctx: &BlockContext) -> Result<Vec<u8>> {
        self.atomic("rotate_queries", || self.rotate_queries_inner(ctx))
    }

    fn rotate_queries_inner(&self, ctx: &BlockContext) -> Result<Vec<u8>> {
        let len = cyclelist::len(&self.conn)?;
        if len == 0 {
            return Err(OracleError::EmptyCyclelist);
        }
        let next = (state::get_u64(&self.conn, state::CYCLE_INDEX)? + 1) % len;
        state::set_u64(&self.conn, state::CYCLE_INDEX, next)?;
        let data = cyclelist::at(&self.conn, next)?.ok_or(OracleError::EmptyCyclelist)?;

        let meta = self.open_cycle_round(ctx, &data)?;
        tracing::debug!(
            index = next,
            query_id = %query_id_hex(&meta.query_id),
            meta_id = meta.id,
            "cycle list rotated"
        );
        self.emit(OracleEvent::RotatedQueries {
            query_id: query_id_hex(&meta.query_id),
            index: next,
            meta_id: meta.id,
        });

        if next == 0 {
            self.check_and_distribute_liveness_rewards()?;
        }
        Ok(data)
    }

    /// Make sure the in-turn query has an open cycle-list round.
    ///
    /// An expired round that was reported on is aggregated first. An expired
    /// round nobody reported on moves to a new id, keeping its tips.
    fn open_cycle_round(&self, ctx: &BlockContext, data: &[u8]) -> Result<QueryMeta> {
        let query_id = query_data::query_id(data);
        let mut meta = match self.current_query(&query_id)? {
            Some(meta) if meta.is_expired(ctx.height) && meta.has_revealed_reports => {
                self.close_round(ctx, &meta)?;
                self.fresh_cycle_round(ctx, data)?
            }
            Some(mut meta) if meta.is_expired(ctx.height) => {
                self.renew_round(ctx, &mut meta)?;
                meta
            }
            Some(meta) => meta,
            None => self.fresh_cycle_round(ctx, data)?,
        };
        meta.cycle_list = true;
        self.save_query(&meta)?;
        Ok(meta)
    }

    fn fresh_cycle_round(&self, ctx: &BlockContext, data: &[u8]) -> Result<QueryMeta> {
        let (_, spec) = self.data_spec(data)?;
        self.initialize_query(ctx, data, spec.report_block_window)
    }

    /// Replace the cycle list and restart rotation from its first entry.
    pub(crate) fn set_cyclelist(&self, queries: &[Vec<u8>]) -> Result<()> {
        cyclelist::replace(&self.conn, queries)?;
        state::set_u64(&self.conn, state::CYCLE_INDEX, 0)?;
        tracing::info!(queries = queries.len(), "cycle list updated");
        self.emit(OracleEvent::CyclelistUpdated {
            queries: queries.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEnv;
    use tally_db::queries::reports;
    use tally_types::MicroReport;

    fn seeded(env: &MockEnv, assets: &[&str]) -> Keeper {
        let keeper = env.keeper();
        let list: Vec<_> = assets.iter().map(|a| env.spot_price(a)).collect();
        keeper.set_cyclelist(&list).expect("cyclelist");
        keeper
    }

    #[test]
    fn test_rotation_is_cyclic() {
        let env = MockEnv::new();
        let keeper = seeded(&env, &["eth", "btc", "trb"]);
        let start = keeper.current_query_in_cycle_list().expect("current");
        assert_eq!(start, env.spot_price("eth"));
        assert_eq!(keeper.next_query_in_cycle_list().expect("next"), env.spot_price("btc"));

        let mut seen = Vec::new();
        for h in 1..=3 {
            seen.push(keeper.rotate_queries(&BlockContext::new(h, h * 1_000)).expect("rotate"));
        }
        assert_eq!(seen[0], env.spot_price("btc"));
        assert_eq!(seen[1], env.spot_price("trb"));
        assert_eq!(seen[2], start);
    }

    #[test]
    fn test_rotate_empty_list_errors() {
        let env = MockEnv::new();
        let keeper = env.keeper();
        assert!(matches!(
            keeper.rotate_queries(&BlockContext::new(1, 1)),
            Err(OracleError::EmptyCyclelist)
        ));
        assert!(matches!(
            keeper.current_query_in_cycle_list(),
            Err(OracleError::EmptyCyclelist)
        ));
        assert!(!keeper.is_in_turn(&env.spot_price("eth")).expect("in turn"));
    }

    #[test]
    fn test_rotation_opens_cycle_round() {
        let env = MockEnv::new();
        let keeper = seeded(&env, &["eth", "btc"]);
        keeper.rotate_queries(&BlockContext::new(5, 1)).expect("rotate");
        let qid = query_data::query_id(&env.spot_price("btc"));
        let meta = keeper.current_query(&qid).expect("meta").expect("open");
        assert!(meta.cycle_list);
        assert_eq!(meta.expiration, 7);
        let events = keeper.take_events();
        assert!(events.iter().any(|e| matches!(e, OracleEvent::RotatedQueries { index: 1, .. })));
    }

    #[test]
    fn test_rotation_renews_unreported_round() {
        let env = MockEnv::new();
        let keeper = seeded(&env, &["eth"]);
        keeper.rotate_queries(&BlockContext::new(1, 1)).expect("rotate");
        let qid = query_data::query_id(&env.spot_price("eth"));
        let first = keeper.current_query(&qid).expect("meta").expect("open");

        keeper.rotate_queries(&BlockContext::new(10, 2)).expect("rotate");
        let second = keeper.current_query(&qid).expect("meta").expect("open");
        assert_ne!(first.id, second.id);
        assert_eq!(second.round, first.round + 1);
        assert_eq!(second.expiration, 12);
    }

    #[test]
    fn test_rotation_closes_expired_reported_round() {
        let env = MockEnv::new();
        let keeper = seeded(&env, &["eth"]);
        keeper.rotate_queries(&BlockContext::new(1, 1)).expect("rotate");
        let qid = query_data::query_id(&env.spot_price("eth"));
        let mut meta = keeper.current_query(&qid).expect("meta").expect("open");
        meta.has_revealed_reports = true;
        keeper.save_query(&meta).expect("save");
        reports::insert(
            keeper.connection(),
            &MicroReport {
                reporter: MockEnv::address(1),
                power: 1,
                query_type: "SpotPrice".into(),
                query_id: qid,
                aggregate_method: "weighted-median".into(),
                value: crate::mock::uint_value(3),
                timestamp_ms: 1,
                cycle_list: true,
                block_number: 2,
                meta_id: meta.id,
            },
        )
        .expect("report");

        keeper.rotate_queries(&BlockContext::new(9, 9_000)).expect("rotate");
        let agg = tally_db::queries::aggregates::latest(keeper.connection(), &qid)
            .expect("latest")
            .expect("aggregate");
        assert_eq!(agg.meta_id, meta.id);
        let reopened = keeper.current_query(&qid).expect("meta").expect("open");
        assert_ne!(reopened.id, meta.id);
        assert!(!reopened.has_revealed_reports);
    }

    #[test]
    fn test_update_resets_index() {
        let env = MockEnv::new();
        let keeper = seeded(&env, &["eth", "btc"]);
        keeper.rotate_queries(&BlockContext::new(1, 1)).expect("rotate");
        keeper.set_cyclelist(&[env.spot_price("trb")]).expect("update");
        assert_eq!(
            keeper.current_query_in_cycle_list().expect("current"),
            env.spot_price("trb")
        );
        assert_eq!(keeper.cyclelist().expect("list").len(), 1);
    }
}
