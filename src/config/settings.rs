use crate::core::monetary::{Amount, DEFAULT_BASE_REWARD, DEFAULT_HALVING_INTERVAL};
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const DATA_DIR_KEY: &str = "ROSTER_DATA_DIR";
const INITIAL_DIFFICULTY_KEY: &str = "ROSTER_INITIAL_DIFFICULTY";
const MAX_DIFFICULTY_KEY: &str = "ROSTER_MAX_DIFFICULTY";
const TARGET_BLOCK_MS_KEY: &str = "ROSTER_TARGET_BLOCK_MS";

/// How a miner picks transactions out of the mempool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    AllPending,
    HighestFeeFirst,
}

/// Per-node chain parameters
///
/// Every node gets its own copy; nothing here is process-global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub initial_difficulty: u32,
    pub min_difficulty: u32,
    pub max_difficulty: u32,
    pub target_block_time_ms: u64,
    pub adjust_every_blocks: u64,
    pub tolerance: f64,
    pub base_reward: Amount,
    pub halving_interval: u64,
    pub selection: SelectionMode,
    pub max_block_transactions: usize,
    pub data_dir: PathBuf,
}

impl Default for ChainSettings {
    fn default() -> Self {
        ChainSettings {
            initial_difficulty: 1,
            min_difficulty: 1,
            max_difficulty: 10,
            target_block_time_ms: 10_000,
            adjust_every_blocks: 10,
            tolerance: 0.2,
            base_reward: DEFAULT_BASE_REWARD,
            halving_interval: DEFAULT_HALVING_INTERVAL,
            selection: SelectionMode::AllPending,
            max_block_transactions: 100,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ChainSettings {
    /// Defaults, then the optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<ChainSettings> {
        let mut settings = match path {
            Some(path) => ChainSettings::from_toml_file(path)?,
            None => ChainSettings::default(),
        };
        settings.apply_overrides(|key| env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<ChainSettings> {
        let text = fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        ChainSettings::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<ChainSettings> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(INITIAL_DIFFICULTY_KEY) {
            self.initial_difficulty = parse_override(INITIAL_DIFFICULTY_KEY, &value)?;
        }
        if let Some(value) = lookup(MAX_DIFFICULTY_KEY) {
            self.max_difficulty = parse_override(MAX_DIFFICULTY_KEY, &value)?;
        }
        if let Some(value) = lookup(TARGET_BLOCK_MS_KEY) {
            self.target_block_time_ms = parse_override(TARGET_BLOCK_MS_KEY, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_difficulty == 0 {
            return Err(BlockchainError::Config(
                "min_difficulty must be at least 1".to_string(),
            ));
        }
        if !(self.min_difficulty..=self.max_difficulty).contains(&self.initial_difficulty) {
            return Err(BlockchainError::Config(format!(
                "initial_difficulty {} is outside [{}, {}]",
                self.initial_difficulty, self.min_difficulty, self.max_difficulty
            )));
        }
        if self.adjust_every_blocks == 0 {
            return Err(BlockchainError::Config(
                "adjust_every_blocks must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.tolerance) {
            return Err(BlockchainError::Config(format!(
                "tolerance {} must be in [0, 1)",
                self.tolerance
            )));
        }
        if self.base_reward.is_negative() {
            return Err(BlockchainError::Config(
                "base_reward must not be negative".to_string(),
            ));
        }
        if self.max_block_transactions == 0 {
            return Err(BlockchainError::Config(
                "max_block_transactions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Node-isolated storage directory, e.g. `data/node_a`
    pub fn node_data_dir(&self, node: &str) -> PathBuf {
        self.data_dir
            .join(format!("node_{}", node.to_ascii_lowercase()))
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BlockchainError::Config(format!("{key} has invalid value {value:?}")))
}
