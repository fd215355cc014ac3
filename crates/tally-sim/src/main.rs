//! tally-sim: drives the oracle engine through a run of simulated blocks.
//!
//! Wires the keeper to the in-memory collaborators, seeds stake and the
//! cycle list from a TOML config, then for every block runs begin block,
//! the scheduled tips, one report per live reporter on the in-turn query,
//! and end block. Prints a JSON summary at the end.
//!
//! ```sh
//! RUST_LOG=tally=debug tally-sim sim.toml
//! ```

mod config;

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use tally_oracle::mock::{uint_value, MockEnv};
use tally_oracle::{BlockContext, Keeper, KeeperConfig, OracleMsg};
use tally_types::{query_id_hex, TIME_BASED_REWARDS_POOL};

use crate::config::SimConfig;

#[derive(Default)]
struct Tally {
    reports: u64,
    rejected: u64,
    aggregates: u64,
    events: BTreeMap<&'static str, u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("tally=info".parse()?),
        )
        .init();

    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = SimConfig::load(path.as_deref())?;
    info!(
        blocks = config.chain.blocks,
        reporters = config.reporters.len(),
        queries = config.cyclelist.len(),
        "simulation starting"
    );

    let env = MockEnv::new();
    let conn = if config.chain.db_path.is_empty() {
        tally_db::open_memory()?
    } else {
        tally_db::open(&PathBuf::from(&config.chain.db_path))?
    };
    tally_db::queries::params::set(&conn, &config.params)?;
    let keeper = Keeper::new(conn, KeeperConfig::new(MockEnv::authority()), env.collaborators());

    for r in &config.reporters {
        env.staked_reporter(r.id, r.stake);
    }
    for tip in &config.tips {
        env.bank.fund_account(&MockEnv::address(tip.tipper), tip.amount);
    }
    let genesis = BlockContext::new(0, config.chain.genesis_time_ms);
    keeper.deliver(
        &genesis,
        &OracleMsg::UpdateCyclelist {
            authority: MockEnv::authority().to_string(),
            cyclelist: config.cyclelist.iter().map(|a| env.spot_price(a)).collect(),
        },
    )?;

    let mut rng = StdRng::seed_from_u64(config.chain.seed);
    let mut tally = Tally::default();
    for height in 1..=config.chain.blocks {
        let time_ms = config.chain.genesis_time_ms + height * config.chain.block_time_ms;
        let ctx = BlockContext::new(height, time_ms);
        run_block(&keeper, &env, &config, &ctx, &mut rng, &mut tally)?;
    }

    let rewards: BTreeMap<String, String> = env
        .reporters
        .reward_totals()
        .into_iter()
        .map(|(addr, amount)| (addr.to_string(), amount.to_string()))
        .collect();
    let querier = keeper.querier();
    let summary = serde_json::json!({
        "blocks": config.chain.blocks,
        "reports": tally.reports,
        "rejected": tally.rejected,
        "aggregates": tally.aggregates,
        "events": tally.events,
        "rewards": rewards,
        "dust": querier.dust()?.to_string(),
        "time_based_rewards_pool": env.bank.balance(TIME_BASED_REWARDS_POOL).to_string(),
        "total_tips": querier.total_tips()?.to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_block(
    keeper: &Keeper,
    env: &MockEnv,
    config: &SimConfig,
    ctx: &BlockContext,
    rng: &mut StdRng,
    tally: &mut Tally,
) -> anyhow::Result<()> {
    keeper.begin_block(ctx)?;

    for tip in config.tips.iter().filter(|t| t.block == ctx.height) {
        let msg = OracleMsg::Tip {
            tipper: MockEnv::address(tip.tipper).to_string(),
            query_data: env.spot_price(&tip.asset),
            amount: tip.amount,
        };
        if let Err(e) = keeper.deliver(ctx, &msg) {
            warn!(height = ctx.height, asset = %tip.asset, error = %e, "tip rejected");
        }
    }

    let in_turn = keeper.current_query_in_cycle_list()?;
    let mut targets = vec![in_turn];
    // Tipped rounds are answered too.
    for meta in keeper.querier().tipped_queries()? {
        if !targets.contains(&meta.query_data) {
            targets.push(meta.query_data);
        }
    }

    for data in &targets {
        for r in &config.reporters {
            if rng.gen_bool(r.miss_rate) {
                continue;
            }
            let offset = rng.gen_range(0..=2 * r.jitter);
            let value = (r.price + offset).saturating_sub(r.jitter);
            let msg = OracleMsg::SubmitValue {
                creator: MockEnv::address(r.id).to_string(),
                query_data: data.clone(),
                value: uint_value(value),
                salt: None,
            };
            match keeper.deliver(ctx, &msg) {
                Ok(_) => tally.reports += 1,
                Err(e) => {
                    tally.rejected += 1;
                    tracing::debug!(
                        height = ctx.height,
                        reporter = r.id,
                        error = %e,
                        "report rejected"
                    );
                }
            }
        }
    }

    for aggregate in keeper.end_block(ctx)? {
        tally.aggregates += 1;
        info!(
            height = ctx.height,
            query_id = %query_id_hex(&aggregate.query_id),
            value = %aggregate.aggregate_value,
            power = aggregate.aggregate_power,
            "aggregate"
        );
    }
    for event in keeper.take_events() {
        *tally.events.entry(event.kind()).or_insert(0) += 1;
    }
    Ok(())
}
