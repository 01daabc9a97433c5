//! Test utilities for ledger testing

use crate::config::ChainSettings;
use crate::core::{Amount, NodeEngine};
use crate::error::Result;
use crate::storage::MemoryStore;
use crate::wallet::{Wallet, WalletKeys};
use std::sync::Arc;
use tempfile::TempDir;

pub fn coins(s: &str) -> Amount {
    s.parse().expect("test amounts are well formed")
}

/// Settings tuned so mining finishes in milliseconds
pub fn fast_settings() -> ChainSettings {
    ChainSettings {
        initial_difficulty: 1,
        min_difficulty: 1,
        max_difficulty: 4,
        target_block_time_ms: 1,
        adjust_every_blocks: 1_000,
        ..ChainSettings::default()
    }
}

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| crate::error::BlockchainError::Io(e.to_string()))
}

/// A standalone in-memory node that already has its genesis block
pub fn test_engine(name: &str) -> NodeEngine {
    let engine = NodeEngine::new(
        name,
        WalletKeys::generate().expect("key generation works"),
        Arc::new(MemoryStore::new()),
        fast_settings(),
    )
    .expect("test settings are valid");
    engine.ensure_genesis().expect("genesis can be created");
    engine
}

/// Register a wallet and let it mine `blocks` blocks, one coin of reward each
pub fn funded_wallet(engine: &NodeEngine, display_name: &str, blocks: u64) -> (Wallet, WalletKeys) {
    let (wallet, keys) = engine
        .create_wallet(display_name)
        .expect("wallet registration works");
    for _ in 0..blocks {
        engine
            .mine_pending(keys.private_key())
            .expect("funding block mines");
    }
    (wallet, keys)
}
