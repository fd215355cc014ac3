//! Simulation config file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tally_types::Params;

/// Complete simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    /// Module params written to the store at genesis.
    #[serde(default)]
    pub params: Params,
    #[serde(default = "default_reporters")]
    pub reporters: Vec<ReporterConfig>,
    /// `SpotPrice` assets on the cycle list, in rotation order.
    #[serde(default = "default_cyclelist")]
    pub cyclelist: Vec<String>,
    /// Scheduled tips.
    #[serde(default)]
    pub tips: Vec<TipConfig>,
}

/// Chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_blocks")]
    pub blocks: u64,
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    /// Unix milliseconds of block 0.
    #[serde(default = "default_genesis_time_ms")]
    pub genesis_time_ms: u64,
    /// RNG seed; the same seed replays the same run.
    #[serde(default)]
    pub seed: u64,
    /// SQLite file for the store. Empty = in memory.
    #[serde(default)]
    pub db_path: String,
}

/// One simulated reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Seed byte of the reporter's address.
    pub id: u8,
    pub stake: u128,
    /// Price the reporter centres its values on.
    #[serde(default = "default_price")]
    pub price: u64,
    /// Maximum deviation from `price`, either way.
    #[serde(default)]
    pub jitter: u64,
    /// Probability of skipping a block, 0.0 to 1.0.
    #[serde(default)]
    pub miss_rate: f64,
}

/// A tip paid at a given block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipConfig {
    pub block: u64,
    pub asset: String,
    pub amount: u128,
    #[serde(default = "default_tipper")]
    pub tipper: u8,
}

fn default_blocks() -> u64 {
    20
}

fn default_block_time_ms() -> u64 {
    1_000
}

fn default_genesis_time_ms() -> u64 {
    1_700_000_000_000
}

fn default_price() -> u64 {
    2_000
}

fn default_tipper() -> u8 {
    0xEE
}

fn default_reporters() -> Vec<ReporterConfig> {
    [(1, 5_000_000), (2, 3_000_000), (3, 1_000_000)]
        .into_iter()
        .map(|(id, stake)| ReporterConfig {
            id,
            stake,
            price: default_price(),
            jitter: 10,
            miss_rate: 0.1,
        })
        .collect()
}

fn default_cyclelist() -> Vec<String> {
    vec!["eth".to_string(), "btc".to_string(), "trb".to_string()]
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            blocks: default_blocks(),
            block_time_ms: default_block_time_ms(),
            genesis_time_ms: default_genesis_time_ms(),
            seed: 0,
            db_path: String::new(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            params: Params::default(),
            reporters: default_reporters(),
            cyclelist: default_cyclelist(),
            tips: Vec::new(),
        }
    }
}

impl SimConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.params.validate()?;
        if self.cyclelist.is_empty() {
            anyhow::bail!("cyclelist must name at least one asset");
        }
        if let Some(r) = self.reporters.iter().find(|r| !(0.0..=1.0).contains(&r.miss_rate)) {
            anyhow::bail!("reporter {} miss_rate must be within 0.0..=1.0", r.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.chain.blocks, 20);
        assert_eq!(config.reporters.len(), 3);
        assert_eq!(config.cyclelist, vec!["eth", "btc", "trb"]);
        config.validate().expect("valid");
    }

    #[test]
    fn test_partial_toml() {
        let config: SimConfig = toml::from_str(
            r#"
            cyclelist = ["eth"]

            [chain]
            blocks = 5

            [params]
            liveness_cycles = 2

            [[reporters]]
            id = 7
            stake = 2000000
            "#,
        )
        .expect("parse");
        assert_eq!(config.chain.blocks, 5);
        assert_eq!(config.chain.block_time_ms, 1_000);
        assert_eq!(config.params.liveness_cycles, 2);
        assert_eq!(config.reporters[0].price, 2_000);
        assert!(config.tips.is_empty());
    }

    #[test]
    fn test_rejects_bad_miss_rate() {
        let mut config = SimConfig::default();
        config.reporters[0].miss_rate = 1.5;
        assert!(config.validate().is_err());
    }
}
