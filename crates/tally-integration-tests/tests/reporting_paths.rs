//! Integration test: the alternative reporting paths.
//!
//! 1. Commit-reveal on a tipped query, revealed inside the offset window
//! 2. No-stake reports stored without stake and never aggregated
//! 3. Bridge deposits opening their own rounds and sharing one liveness slot

use alloy_primitives::U256;
use tally_db::queries::liveness;
use tally_oracle::commit::commitment_hash;
use tally_oracle::liveness::bridge_marker_id;
use tally_oracle::mock::{uint_value, MockEnv};
use tally_oracle::{BlockContext, Keeper, OracleError, OracleMsg};
use tally_types::abi::{self, AbiToken};
use tally_types::query_data;

fn run_empty_blocks(keeper: &Keeper, heights: std::ops::RangeInclusive<u64>) {
    for height in heights {
        let ctx = BlockContext::new(height, height * 1_000);
        keeper.begin_block(&ctx).expect("begin block");
        keeper.end_block(&ctx).expect("end block");
    }
}

#[test]
fn commit_reveal_round_trip() {
    let env = MockEnv::new();
    let keeper = env.keeper();
    let reporter = env.staked_reporter(1, 1_000_000);
    let tipper = MockEnv::address(9);
    env.bank.fund_account(&tipper, 100);
    let link = env.spot_price("link");
    let qid = query_data::query_id(&link);

    // =========================================================
    // Block 1 tips, block 2 commits
    // =========================================================
    let b1 = BlockContext::new(1, 1_000);
    keeper
        .deliver(
            &b1,
            &OracleMsg::Tip {
                tipper: tipper.to_string(),
                query_data: link.clone(),
                amount: 100,
            },
        )
        .expect("tip");

    let value = uint_value(7);
    let salt = "beef";
    keeper
        .deliver(
            &BlockContext::new(2, 2_000),
            &OracleMsg::CommitReport {
                creator: reporter.to_string(),
                query_data: link.clone(),
                hash: commitment_hash(&value, salt).expect("hash"),
            },
        )
        .expect("commit");

    // Nothing was revealed, so nothing closes.
    run_empty_blocks(&keeper, 3..=4);
    assert!(keeper.querier().current_query(&qid).is_ok());

    // =========================================================
    // Block 5: reveal past expiration (3) but within the offset (6)
    // =========================================================
    let b5 = BlockContext::new(5, 5_000);
    keeper
        .deliver(
            &b5,
            &OracleMsg::SubmitValue {
                creator: reporter.to_string(),
                query_data: link.clone(),
                value: value.clone(),
                salt: Some(salt.to_string()),
            },
        )
        .expect("reveal");
    let created = keeper.end_block(&b5).expect("end block");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].aggregate_value, value);
    assert_eq!(env.reporters.reward_totals()[&reporter], 98);
}

#[test]
fn no_stake_reports_stay_out_of_rounds() {
    let env = MockEnv::new();
    let keeper = env.keeper();
    let anyone = MockEnv::address(42);
    let data = env.string_query("what is the answer?");
    let qid = query_data::query_id(&data);

    for height in 1..=2 {
        keeper
            .deliver(
                &BlockContext::new(height, height * 1_000),
                &OracleMsg::NoStakeReport {
                    creator: anyone.to_string(),
                    query_data: data.clone(),
                    value: uint_value(42),
                },
            )
            .expect("no-stake report");
    }
    let dup = keeper.deliver(
        &BlockContext::new(2, 2_000),
        &OracleMsg::NoStakeReport {
            creator: anyone.to_string(),
            query_data: data.clone(),
            value: uint_value(43),
        },
    );
    assert!(matches!(dup, Err(OracleError::NoStakeReportExists)));

    let q = keeper.querier();
    assert_eq!(q.no_stake_reports_by_query_id(&qid).expect("by id").len(), 2);
    assert_eq!(
        q.no_stake_reports_by_reporter(anyone.as_str())
            .expect("by reporter")
            .len(),
        2
    );
    assert!(q.current_query(&qid).is_err());
    assert!(q.reports_by_query_id(&qid).expect("reports").is_empty());
}

#[test]
fn bridge_deposits_share_liveness_slot() {
    let env = MockEnv::new();
    let keeper = env.keeper();
    let reporter = env.staked_reporter(1, 1_000_000);
    let deposit_value = hex::encode(abi::encode(&[
        AbiToken::Address([3; 20]),
        AbiToken::String(reporter.to_string()),
        AbiToken::Uint(U256::from(500u64)),
        AbiToken::Uint(U256::from(0u64)),
    ]));

    // Two deposits reported in the same block.
    let ctx = BlockContext::new(10, 10_000);
    for deposit_id in [1, 2] {
        keeper
            .deliver(
                &ctx,
                &OracleMsg::SubmitValue {
                    creator: reporter.to_string(),
                    query_data: query_data::encode_bridge(true, deposit_id),
                    value: deposit_value.clone(),
                    salt: None,
                },
            )
            .expect("deposit report");
    }

    // Deposit rounds stay open for the bridge window.
    let before = BlockContext::new(2_010, 2_010_000);
    assert!(keeper.end_block(&before).expect("end block").is_empty());
    let after = BlockContext::new(2_011, 2_011_000);
    assert_eq!(keeper.end_block(&after).expect("end block").len(), 2);

    assert_eq!(
        liveness::opportunities(keeper.connection(), &bridge_marker_id()).expect("opportunities"),
        2
    );
    let record = liveness::record(keeper.connection(), &reporter)
        .expect("record")
        .expect("tracked");
    assert_eq!(record.queries_reported, 2);

    // Claimed deposits and withdrawals are refused.
    env.bridge.claim(3);
    for data in [
        query_data::encode_bridge(true, 3),
        query_data::encode_bridge(false, 4),
    ] {
        let err = keeper
            .deliver(
                &after,
                &OracleMsg::SubmitValue {
                    creator: reporter.to_string(),
                    query_data: data,
                    value: deposit_value.clone(),
                    salt: None,
                },
            )
            .expect_err("refused");
        assert!(matches!(
            err,
            OracleError::DepositAlreadyClaimed(_) | OracleError::BridgeWithdrawalReport
        ));
    }
}
