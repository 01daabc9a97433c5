//! Data storage and persistence
//!
//! The engine talks to persistence only through [`LedgerStore`]. Two backends
//! ship with the crate: an in-memory store for simulations and tests, and a
//! sled store that keeps each node in its own directory.

pub mod memory_store;
pub mod sled_store;

pub use memory_store::MemoryStore;
pub use sled_store::SledStore;

use crate::core::{Block, Transaction};
use crate::error::Result;
use crate::wallet::Wallet;

pub trait LedgerStore: Send + Sync {
    // Blocks

    /// Persist a mined block with its transactions linked, dropping them from the mempool
    fn append_block(&self, block: &Block) -> Result<()>;

    fn find_block(&self, index: u64) -> Result<Option<Block>>;

    /// Overwrite a stored block and its transaction set in one step
    fn update_block_with_transactions(&self, block: &Block) -> Result<()>;

    fn delete_block(&self, index: u64) -> Result<()>;

    /// Full chain in index order, transactions attached
    fn chain(&self) -> Result<Vec<Block>>;

    fn tip(&self) -> Result<Option<Block>>;

    /// Up to `count` most recent blocks excluding genesis, oldest first
    fn last_non_genesis_blocks(&self, count: usize) -> Result<Vec<Block>>;

    fn block_count(&self) -> Result<u64>;

    /// Swap in an adopted chain: clears blocks, transactions and mempool, then inserts
    fn replace_chain(&self, chain: &[Block]) -> Result<()>;

    // Wallets

    /// Assigns a fresh id
    fn insert_wallet(&self, wallet: Wallet) -> Result<Wallet>;

    fn find_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>>;

    fn find_wallet_by_id(&self, id: u64) -> Result<Option<Wallet>>;

    fn delete_wallet(&self, id: u64) -> Result<()>;

    fn list_wallets(&self) -> Result<Vec<Wallet>>;

    // Transactions

    fn next_transaction_id(&self) -> Result<u64>;

    /// Search mined transactions first, then the mempool
    fn find_transaction(&self, id: u64) -> Result<Option<Transaction>>;

    /// Mined and pending transactions where `address` is sender or receiver
    fn transactions_for_address(&self, address: &str) -> Result<Vec<Transaction>>;

    // Mempool

    fn mempool(&self) -> Result<Vec<Transaction>>;

    /// Assigns a fresh id and clears any block link
    fn add_to_mempool(&self, tx: Transaction) -> Result<Transaction>;

    fn remove_from_mempool(&self, ids: &[u64]) -> Result<()>;

    fn clear_mempool(&self) -> Result<()>;

    // Node settings

    /// Difficulty the node mines at next, if one was ever recorded
    fn stored_difficulty(&self) -> Result<Option<u32>>;

    fn store_difficulty(&self, difficulty: u32) -> Result<()>;
}
