//! Report intake.
//!
//! `SubmitValue` and `BatchSubmitValue` share one path: resolve the
//! reporter's stake and power, validate the item, work out which round the
//! report belongs to (the direct-reveal rules), then store it with
//! [`Keeper::set_value`].
//!
//! Batch items run as nested units. An item that is rejected leaves no
//! writes and is reported by index; a storage failure aborts the whole
//! batch.

use serde::{Deserialize, Serialize};
use tally_db::queries::reports;
use tally_types::{
    query_data, query_id_hex, strip_hex_prefix, AccAddress, AggregationMethod, MicroReport,
    OracleEvent, Params, QueryMeta,
};

use crate::aggregate::median;
use crate::expected_keepers::ReporterStake;
use crate::keeper::{BlockContext, Keeper};
use crate::{OracleError, Result};

/// One `(query_data, value)` pair of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub query_data: Vec<u8>,
    /// Hex value, `0x` optional.
    pub value: String,
}

/// A reporter cleared to submit, with the power its reports carry.
#[derive(Clone, Debug)]
pub(crate) struct EligibleReporter {
    pub address: AccAddress,
    pub stake: ReporterStake,
    pub power: u64,
}

impl Keeper {
    /// Resolve a reporter's stake and reporting power.
    ///
    /// # Errors
    ///
    /// [`OracleError::NotEnoughStake`] below the minimum, or the staking
    /// collaborator's error if the stake cannot be read.
    pub(crate) fn eligible_reporter(
        &self,
        address: AccAddress,
        params: &Params,
    ) -> Result<EligibleReporter> {
        let stake = self.reporters.reporter_stake(&address)?;
        let min = u128::from(params.min_stake_amount);
        if stake.amount < min {
            return Err(OracleError::NotEnoughStake {
                stake: stake.amount,
                min,
            });
        }
        let power = u64::try_from(stake.amount / u128::from(params.power_reduction))
            .map_err(|_| OracleError::Overflow)?;
        Ok(EligibleReporter {
            address,
            stake,
            power,
        })
    }

    /// Submit one value, or reveal a commitment when `salt` is given.
    pub fn submit_value(
        &self,
        ctx: &BlockContext,
        creator: &str,
        data: &[u8],
        value: &str,
        salt: Option<&str>,
    ) -> Result<MicroReport> {
        self.atomic("submit_value", || {
            let address = self.parse_address(creator)?;
            let params = self.params()?;
            let reporter = self.eligible_reporter(address, &params)?;
            let report = match salt {
                Some(salt) => self.reveal_commitment(ctx, &reporter, data, value, salt, &params)?,
                None => self.submit_item(ctx, &reporter, data, value, &params)?,
            };
            self.snapshot_stake(&reporter, data);
            Ok(report)
        })
    }

    /// Submit several values at once. Returns the indices of rejected items.
    ///
    /// # Errors
    ///
    /// The whole batch fails, writing nothing, on an invalid creator, an
    /// unreadable or insufficient stake, too many items or a storage
    /// failure.
    pub fn batch_submit_value(
        &self,
        ctx: &BlockContext,
        creator: &str,
        items: &[BatchItem],
    ) -> Result<Vec<u32>> {
        self.atomic("batch_submit_value", || {
            self.batch_submit_value_inner(ctx, creator, items)
        })
    }

    fn batch_submit_value_inner(
        &self,
        ctx: &BlockContext,
        creator: &str,
        items: &[BatchItem],
    ) -> Result<Vec<u32>> {
        let address = self.parse_address(creator)?;
        let params = self.params()?;
        let reporter = self.eligible_reporter(address, &params)?;

        let max = params.max_batch_size;
        if items.len() > max as usize {
            return Err(OracleError::TooManyReports { max });
        }

        let mut failed = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let outcome = self.atomic("batch_item", || {
                self.submit_item(ctx, &reporter, &item.query_data, &item.value, &params)?;
                self.snapshot_stake(&reporter, &item.query_data);
                Ok(())
            });
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_storage_failure() => return Err(e),
                Err(e) => {
                    tracing::debug!(index = i, error = %e, "batch item rejected");
                    failed.push(u32::try_from(i).map_err(|_| OracleError::Overflow)?);
                }
            }
        }
        tracing::info!(
            reporter = %reporter.address,
            items = items.len(),
            failed = failed.len(),
            "batch submitted"
        );
        Ok(failed)
    }

    fn snapshot_stake(&self, reporter: &EligibleReporter, data: &[u8]) {
        self.queue_stake_snapshot(&reporter.address, &reporter.stake, &query_data::query_id(data));
    }

    /// Validate and store one direct report.
    fn submit_item(
        &self,
        ctx: &BlockContext,
        reporter: &EligibleReporter,
        data: &[u8],
        value: &str,
        params: &Params,
    ) -> Result<MicroReport> {
        self.check_query_data(data, params)?;
        if strip_hex_prefix(value.trim()).is_empty() {
            return Err(OracleError::EmptyValue);
        }
        let deposit = self.bridge_deposit(data)?;
        let in_turn = self.is_in_turn(data)?;

        let meta = match self.current_query(&query_data::query_id(data))? {
            Some(meta) => meta,
            None if deposit => self.token_bridge_deposit_query(ctx, data, params)?,
            None => return Err(OracleError::NoTipsNotInCycle),
        };
        let (meta, in_cycle) = self.reveal_round(ctx, meta, data, in_turn || deposit)?;
        self.set_value(ctx, &reporter.address, meta, value, reporter.power, in_cycle)
    }

    /// Apply the direct-reveal rules to the stored round of a query.
    ///
    /// Returns the round the report goes into and whether it counts as a
    /// cycle-list report.
    fn reveal_round(
        &self,
        ctx: &BlockContext,
        mut meta: QueryMeta,
        data: &[u8],
        in_turn: bool,
    ) -> Result<(QueryMeta, bool)> {
        if !meta.is_expired(ctx.height) {
            let in_cycle = in_turn || meta.amount == 0;
            return Ok((meta, in_cycle));
        }
        // Rejections come first so a refused report never closes the round.
        if !in_turn {
            return Err(if meta.amount == 0 {
                OracleError::NoTipsNotInCycle
            } else {
                OracleError::SubmissionWindowExpired
            });
        }

        if meta.has_revealed_reports {
            // Aggregate the finished round before anything reuses the query.
            self.close_round(ctx, &meta)?;
            let mut fresh = self.initialize_query(ctx, data, meta.report_buffer_window)?;
            fresh.cycle_list = true;
            return Ok((fresh, true));
        }

        if meta.amount == 0 {
            self.renew_round(ctx, &mut meta)?;
            meta.cycle_list = true;
        } else {
            meta.expiration = ctx
                .height
                .checked_add(meta.report_buffer_window)
                .ok_or(OracleError::Overflow)?;
        }
        Ok((meta, true))
    }

    /// Store a validated report in `meta`'s round.
    ///
    /// # Errors
    ///
    /// [`OracleError::AlreadyReported`] if the reporter already reported in
    /// this round, [`OracleError::InvalidValue`] if the value does not decode
    /// under the query's data spec.
    pub(crate) fn set_value(
        &self,
        ctx: &BlockContext,
        reporter: &AccAddress,
        mut meta: QueryMeta,
        value: &str,
        power: u64,
        in_cycle: bool,
    ) -> Result<MicroReport> {
        if reports::exists(&self.conn, &meta.query_id, reporter, meta.id)? {
            return Err(OracleError::AlreadyReported {
                reporter: reporter.to_string(),
                meta_id: meta.id,
            });
        }
        let (query_type, spec) = self.data_spec(&meta.query_data)?;
        spec.validate_value(value)?;
        self.strategies.get(&spec.aggregation_method)?;
        if spec.aggregation_method == AggregationMethod::WeightedMedian.as_str() {
            median::validate_value(value)?;
        }

        meta.has_revealed_reports = true;
        self.save_query(&meta)?;

        let report = MicroReport {
            reporter: reporter.clone(),
            power,
            query_type,
            query_id: meta.query_id,
            aggregate_method: spec.aggregation_method,
            value: strip_hex_prefix(value.trim()).to_lowercase(),
            timestamp_ms: ctx.time_ms,
            cycle_list: in_cycle,
            block_number: ctx.height,
            meta_id: meta.id,
        };
        reports::insert(&self.conn, &report)?;

        tracing::debug!(
            reporter = %reporter,
            query_id = %query_id_hex(&meta.query_id),
            meta_id = meta.id,
            power,
            in_cycle,
            "report accepted"
        );
        self.emit(OracleEvent::NewReport {
            reporter: reporter.to_string(),
            query_id: query_id_hex(&meta.query_id),
            value: report.value.clone(),
            meta_id: meta.id,
            power,
            cycle_list: in_cycle,
            block_number: ctx.height,
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{string_value, uint_value, MockEnv};
    use tally_types::{ORACLE_MODULE, TIPS_ESCROW_POOL};

    const STAKE: u128 = 5_000_000;

    fn setup() -> (MockEnv, Keeper, AccAddress) {
        let env = MockEnv::new();
        let keeper = env.keeper();
        let reporter = env.staked_reporter(1, STAKE);
        keeper
            .set_cyclelist(&[env.spot_price("btc"), env.spot_price("eth")])
            .expect("cyclelist");
        // Puts "eth" in turn with a round open until height 3.
        keeper.rotate_queries(&BlockContext::new(1, 1_000)).expect("rotate");
        (env, keeper, reporter)
    }

    fn item(query_data: Vec<u8>, value: String) -> BatchItem {
        BatchItem { query_data, value }
    }

    #[test]
    fn test_in_turn_report_accepted() {
        let (env, keeper, reporter) = setup();
        let ctx = BlockContext::new(1, 1_000);
        let report = keeper
            .submit_value(
                &ctx,
                reporter.as_str(),
                &env.spot_price("eth"),
                &format!("0x{}", uint_value(42)),
                None,
            )
            .expect("submit");
        assert_eq!(report.power, 5);
        assert!(report.cycle_list);
        assert_eq!(report.value, uint_value(42));

        let meta = keeper
            .current_query(&report.query_id)
            .expect("meta")
            .expect("open");
        assert!(meta.has_revealed_reports);
        assert_eq!(env.reporters.snapshots().len(), 1);
    }

    #[test]
    fn test_not_in_turn_untipped_rejected() {
        let (env, keeper, reporter) = setup();
        let ctx = BlockContext::new(1, 1_000);
        let err = keeper
            .submit_value(
                &ctx,
                reporter.as_str(),
                &env.spot_price("btc"),
                &uint_value(1),
                None,
            )
            .expect_err("not in turn");
        assert!(matches!(err, OracleError::NoTipsNotInCycle));
    }

    #[test]
    fn test_stake_below_minimum() {
        let (env, keeper, _) = setup();
        let poor = env.staked_reporter(2, 10);
        let err = keeper
            .submit_value(
                &BlockContext::new(1, 1),
                poor.as_str(),
                &env.spot_price("eth"),
                &uint_value(1),
                None,
            )
            .expect_err("poor");
        assert!(matches!(err, OracleError::NotEnoughStake { stake: 10, .. }));
    }

    #[test]
    fn test_duplicate_report_rejected() {
        let (env, keeper, reporter) = setup();
        let ctx = BlockContext::new(1, 1_000);
        let data = env.spot_price("eth");
        keeper
            .submit_value(&ctx, reporter.as_str(), &data, &uint_value(1), None)
            .expect("first");
        let err = keeper
            .submit_value(&ctx, reporter.as_str(), &data, &uint_value(2), None)
            .expect_err("second");
        assert!(matches!(err, OracleError::AlreadyReported { .. }));
    }

    #[test]
    fn test_value_must_decode() {
        let (env, keeper, reporter) = setup();
        let ctx = BlockContext::new(1, 1_000);
        let data = env.spot_price("eth");
        assert!(matches!(
            keeper.submit_value(&ctx, reporter.as_str(), &data, "0x", None),
            Err(OracleError::EmptyValue)
        ));
        assert!(matches!(
            keeper.submit_value(&ctx, reporter.as_str(), &data, "xyz", None),
            Err(OracleError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_tipped_round_extended_when_in_turn() {
        let (env, keeper, reporter) = setup();
        let data = env.spot_price("eth");
        let ctx = BlockContext::new(1, 1_000);
        let mut meta = keeper.initialize_query(&ctx, &data, 2).expect("init");
        meta.amount = 50;
        keeper.save_query(&meta).expect("save");

        let late = BlockContext::new(10, 2_000);
        let report = keeper
            .submit_value(&late, reporter.as_str(), &data, &uint_value(1), None)
            .expect("extended");
        assert_eq!(report.meta_id, meta.id);
        let stored = keeper.current_query(&meta.query_id).expect("meta").expect("open");
        assert_eq!(stored.expiration, 12);
        assert_eq!(stored.amount, 50);
    }

    #[test]
    fn test_tipped_round_expired_not_in_turn() {
        let (env, keeper, reporter) = setup();
        let data = env.spot_price("btc");
        let mut meta = keeper
            .initialize_query(&BlockContext::new(1, 1), &data, 2)
            .expect("init");
        meta.amount = 50;
        keeper.save_query(&meta).expect("save");
        let late = BlockContext::new(10, 2);
        let err = keeper
            .submit_value(&late, reporter.as_str(), &data, &uint_value(1), None)
            .expect_err("expired");
        assert!(matches!(err, OracleError::SubmissionWindowExpired));
    }

    #[test]
    fn test_untipped_expired_in_turn_renews() {
        let (env, keeper, reporter) = setup();
        let data = env.spot_price("eth");
        let meta = keeper
            .initialize_query(&BlockContext::new(1, 1), &data, 2)
            .expect("init");
        keeper.save_query(&meta).expect("save");
        let late = BlockContext::new(10, 2);
        let report = keeper
            .submit_value(&late, reporter.as_str(), &data, &uint_value(1), None)
            .expect("renewed");
        assert_ne!(report.meta_id, meta.id);
    }

    #[test]
    fn test_expired_reported_round_closed_before_new_report() {
        let (env, keeper, reporter) = setup();
        let other = env.staked_reporter(2, STAKE);
        let data = env.spot_price("eth");
        let ctx = BlockContext::new(1, 1_000);
        let first = keeper
            .submit_value(&ctx, reporter.as_str(), &data, &uint_value(7), None)
            .expect("first");
        let late = BlockContext::new(9, 9_000);
        let second = keeper
            .submit_value(&late, other.as_str(), &data, &uint_value(8), None)
            .expect("second");
        assert_ne!(first.meta_id, second.meta_id);
        let agg = tally_db::queries::aggregates::latest(keeper.connection(), &first.query_id)
            .expect("latest")
            .expect("aggregate");
        assert_eq!(agg.meta_id, first.meta_id);
        assert_eq!(agg.aggregate_value, uint_value(7));
    }

    #[test]
    fn test_mode_query_accepts_strings() {
        let env = MockEnv::new();
        let keeper = env.keeper();
        let reporter = env.staked_reporter(1, STAKE);
        let data = env.string_query("weather");
        keeper.set_cyclelist(&[data.clone()]).expect("cyclelist");
        keeper.rotate_queries(&BlockContext::new(1, 1)).expect("rotate");
        let ctx = BlockContext::new(1, 1);
        let report = keeper
            .submit_value(&ctx, reporter.as_str(), &data, &string_value("sunny"), None)
            .expect("submit");
        assert_eq!(report.aggregate_method, "weighted-mode");
    }

    #[test]
    fn test_batch_partial_failure() {
        let (env, keeper, reporter) = setup();
        let ctx = BlockContext::new(1, 1_000);
        let items = vec![
            item(env.spot_price("eth"), uint_value(1)),
            item(env.spot_price("btc"), uint_value(2)),
            item(Vec::new(), uint_value(3)),
            item(env.spot_price("eth"), String::new()),
        ];
        let failed = keeper
            .batch_submit_value(&ctx, reporter.as_str(), &items)
            .expect("batch");
        assert_eq!(failed, vec![1, 2, 3]);
        let events = keeper.take_events();
        assert_eq!(
            events.iter().filter(|e| matches!(e, OracleEvent::NewReport { .. })).count(),
            1
        );
    }

    #[test]
    fn test_batch_too_large_writes_nothing() {
        let (env, keeper, reporter) = setup();
        let items: Vec<_> = (0..21)
            .map(|_| item(env.spot_price("eth"), uint_value(1)))
            .collect();
        let err = keeper
            .batch_submit_value(&BlockContext::new(1, 1), reporter.as_str(), &items)
            .expect_err("too many");
        assert!(matches!(err, OracleError::TooManyReports { max: 20 }));
        let qid = query_data::query_id(&env.spot_price("eth"));
        assert!(reports::by_query_id(keeper.connection(), &qid).expect("reports").is_empty());
    }

    #[test]
    fn test_batch_invalid_creator_or_unreadable_stake() {
        let (env, keeper, reporter) = setup();
        let items = vec![item(env.spot_price("eth"), uint_value(1))];
        assert!(matches!(
            keeper.batch_submit_value(&BlockContext::new(1, 1), "not-an-address", &items),
            Err(OracleError::InvalidAddress(_))
        ));
        env.reporters.make_unreadable(&reporter);
        assert!(matches!(
            keeper.batch_submit_value(&BlockContext::new(1, 1), reporter.as_str(), &items),
            Err(OracleError::Keeper { .. })
        ));
    }

    /// An expired tipped round on a query that is not in turn, with one
    /// report waiting for end block.
    fn tipped_round_with_report(
        env: &MockEnv,
        keeper: &Keeper,
        reporter: &AccAddress,
    ) -> QueryMeta {
        let tipper = MockEnv::address(9);
        env.bank.fund_account(&tipper, 1_000);
        let data = env.spot_price("btc");
        let ctx = BlockContext::new(1, 1_000);
        let meta = keeper.tip(&ctx, tipper.as_str(), &data, 1_000).expect("tip");
        keeper
            .submit_value(&ctx, reporter.as_str(), &data, &uint_value(7), None)
            .expect("tipped report");
        meta
    }

    #[test]
    fn test_rejected_late_report_leaves_round_and_funds_alone() {
        let (env, keeper, reporter) = setup();
        let meta = tipped_round_with_report(&env, &keeper, &reporter);
        let late_reporter = env.staked_reporter(2, STAKE);
        let rewards_before = env.reporters.rewards();
        assert_eq!(env.bank.balance(ORACLE_MODULE), 980);

        let late = BlockContext::new(10, 10_000);
        let err = keeper
            .deliver(
                &late,
                &crate::msg_server::OracleMsg::SubmitValue {
                    creator: late_reporter.to_string(),
                    query_data: env.spot_price("btc"),
                    value: uint_value(8),
                    salt: None,
                },
            )
            .expect_err("window expired");
        assert!(matches!(err, OracleError::SubmissionWindowExpired));
        assert_eq!(env.bank.balance(ORACLE_MODULE), 980);
        assert_eq!(env.bank.balance(TIPS_ESCROW_POOL), 0);
        assert_eq!(env.reporters.rewards(), rewards_before);
        let open = keeper.current_query(&meta.query_id).expect("meta").expect("open");
        assert_eq!(open.id, meta.id);

        // End block pays the tip exactly once.
        let created = keeper.end_block(&late).expect("end block");
        assert_eq!(created.len(), 1);
        assert_eq!(env.reporters.reward_totals()[&reporter], 980);
        assert_eq!(env.bank.balance(ORACLE_MODULE), 0);
        assert_eq!(env.bank.balance(TIPS_ESCROW_POOL), 980);
        assert!(keeper.end_block(&late).expect("again").is_empty());
        assert_eq!(env.reporters.reward_totals()[&reporter], 980);
    }

    #[test]
    fn test_rejected_batch_item_leaves_round_and_funds_alone() {
        let (env, keeper, reporter) = setup();
        let meta = tipped_round_with_report(&env, &keeper, &reporter);
        let late_reporter = env.staked_reporter(2, STAKE);
        let snapshots_before = env.reporters.snapshots().len();

        let late = BlockContext::new(10, 10_000);
        let failed = keeper
            .batch_submit_value(
                &late,
                late_reporter.as_str(),
                &[item(env.spot_price("btc"), uint_value(8))],
            )
            .expect("batch");
        assert_eq!(failed, vec![0]);
        assert_eq!(env.bank.balance(ORACLE_MODULE), 980);
        assert!(env.reporters.rewards().is_empty());
        assert_eq!(env.reporters.snapshots().len(), snapshots_before);
        assert!(keeper.current_query(&meta.query_id).expect("meta").is_some());
    }

    #[test]
    fn test_untipped_expired_reported_round_not_in_turn() {
        let (env, keeper, reporter) = setup();
        let data = env.spot_price("eth");
        let ctx = BlockContext::new(1, 1_000);
        keeper
            .submit_value(&ctx, reporter.as_str(), &data, &uint_value(7), None)
            .expect("first");
        // Rotation moves the turn to "btc".
        keeper.rotate_queries(&BlockContext::new(4, 4_000)).expect("rotate");
        let other = env.staked_reporter(2, STAKE);
        let late = BlockContext::new(9, 9_000);
        let err = keeper
            .submit_value(&late, other.as_str(), &data, &uint_value(8), None)
            .expect_err("not in turn");
        assert!(matches!(err, OracleError::NoTipsNotInCycle));
        let qid = query_data::query_id(&data);
        assert!(tally_db::queries::aggregates::latest(keeper.connection(), &qid)
            .expect("latest")
            .is_none());
    }
}
