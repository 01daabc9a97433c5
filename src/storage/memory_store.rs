use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::LedgerStore;
use crate::wallet::Wallet;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct MemoryState {
    blocks: BTreeMap<u64, Block>,
    mempool: BTreeMap<u64, Transaction>,
    wallets: BTreeMap<u64, Wallet>,
    next_transaction_id: u64,
    next_wallet_id: u64,
    difficulty: Option<u32>,
}

impl Default for MemoryState {
    fn default() -> Self {
        MemoryState {
            blocks: BTreeMap::new(),
            mempool: BTreeMap::new(),
            wallets: BTreeMap::new(),
            next_transaction_id: 1,
            next_wallet_id: 1,
            difficulty: None,
        }
    }
}

impl MemoryState {
    fn take_transaction_id(&mut self) -> u64 {
        let id = self.next_transaction_id;
        self.next_transaction_id += 1;
        id
    }

    // Adopted or appended blocks may carry ids minted elsewhere
    fn reserve_transaction_ids(&mut self, block: &Block) {
        if let Some(max) = block.get_transactions().iter().map(Transaction::get_id).max() {
            self.next_transaction_id = self.next_transaction_id.max(max + 1);
        }
    }
}

/// Process-lifetime store, one per node
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        match self.inner.read() {
            Ok(state) => Ok(state),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory store");
                Err(BlockchainError::Database(
                    "memory store lock poisoned".to_string(),
                ))
            }
        }
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        match self.inner.write() {
            Ok(state) => Ok(state),
            Err(_) => {
                log::error!("Failed to acquire write lock on memory store");
                Err(BlockchainError::Database(
                    "memory store lock poisoned".to_string(),
                ))
            }
        }
    }
}

fn linked(block: &Block) -> Block {
    let mut block = block.clone();
    block.link_transactions();
    block
}

impl LedgerStore for MemoryStore {
    fn append_block(&self, block: &Block) -> Result<()> {
        let mut state = self.write()?;
        if state.blocks.contains_key(&block.get_index()) {
            return Err(BlockchainError::Database(format!(
                "Block {} already exists",
                block.get_index()
            )));
        }
        for tx in block.get_transactions() {
            state.mempool.remove(&tx.get_id());
        }
        state.reserve_transaction_ids(block);
        state.blocks.insert(block.get_index(), linked(block));
        Ok(())
    }

    fn find_block(&self, index: u64) -> Result<Option<Block>> {
        Ok(self.read()?.blocks.get(&index).cloned())
    }

    fn update_block_with_transactions(&self, block: &Block) -> Result<()> {
        let mut state = self.write()?;
        if !state.blocks.contains_key(&block.get_index()) {
            return Err(BlockchainError::not_found("block", block.get_index()));
        }
        state.reserve_transaction_ids(block);
        state.blocks.insert(block.get_index(), linked(block));
        Ok(())
    }

    fn delete_block(&self, index: u64) -> Result<()> {
        self.write()?.blocks.remove(&index);
        Ok(())
    }

    fn chain(&self) -> Result<Vec<Block>> {
        Ok(self.read()?.blocks.values().cloned().collect())
    }

    fn tip(&self) -> Result<Option<Block>> {
        Ok(self.read()?.blocks.values().next_back().cloned())
    }

    fn last_non_genesis_blocks(&self, count: usize) -> Result<Vec<Block>> {
        let state = self.read()?;
        let mut recent: Vec<Block> = state
            .blocks
            .values()
            .rev()
            .filter(|b| !b.is_genesis())
            .take(count)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    fn block_count(&self) -> Result<u64> {
        Ok(self.read()?.blocks.len() as u64)
    }

    fn replace_chain(&self, chain: &[Block]) -> Result<()> {
        let mut state = self.write()?;
        state.blocks.clear();
        state.mempool.clear();
        for block in chain {
            state.reserve_transaction_ids(block);
            state.blocks.insert(block.get_index(), linked(block));
        }
        Ok(())
    }

    fn insert_wallet(&self, mut wallet: Wallet) -> Result<Wallet> {
        let mut state = self.write()?;
        if state
            .wallets
            .values()
            .any(|w| w.get_address() == wallet.get_address())
        {
            return Err(BlockchainError::Database(format!(
                "Wallet {} already registered",
                wallet.get_address()
            )));
        }
        let id = state.next_wallet_id;
        state.next_wallet_id += 1;
        wallet.set_id(id);
        state.wallets.insert(id, wallet.clone());
        Ok(wallet)
    }

    fn find_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        Ok(self
            .read()?
            .wallets
            .values()
            .find(|w| w.get_address() == address)
            .cloned())
    }

    fn find_wallet_by_id(&self, id: u64) -> Result<Option<Wallet>> {
        Ok(self.read()?.wallets.get(&id).cloned())
    }

    fn delete_wallet(&self, id: u64) -> Result<()> {
        self.write()?.wallets.remove(&id);
        Ok(())
    }

    fn list_wallets(&self) -> Result<Vec<Wallet>> {
        Ok(self.read()?.wallets.values().cloned().collect())
    }

    fn next_transaction_id(&self) -> Result<u64> {
        Ok(self.write()?.take_transaction_id())
    }

    fn find_transaction(&self, id: u64) -> Result<Option<Transaction>> {
        let state = self.read()?;
        let mined = state
            .blocks
            .values()
            .flat_map(|b| b.get_transactions())
            .find(|tx| tx.get_id() == id)
            .cloned();
        Ok(mined.or_else(|| state.mempool.get(&id).cloned()))
    }

    fn transactions_for_address(&self, address: &str) -> Result<Vec<Transaction>> {
        let state = self.read()?;
        Ok(state
            .blocks
            .values()
            .flat_map(|b| b.get_transactions())
            .chain(state.mempool.values())
            .filter(|tx| tx.involves(address))
            .cloned()
            .collect())
    }

    fn mempool(&self) -> Result<Vec<Transaction>> {
        Ok(self.read()?.mempool.values().cloned().collect())
    }

    fn add_to_mempool(&self, mut tx: Transaction) -> Result<Transaction> {
        let mut state = self.write()?;
        let id = state.take_transaction_id();
        tx.set_id(id);
        tx.set_block_id(None);
        state.mempool.insert(id, tx.clone());
        Ok(tx)
    }

    fn remove_from_mempool(&self, ids: &[u64]) -> Result<()> {
        let mut state = self.write()?;
        for id in ids {
            state.mempool.remove(id);
        }
        Ok(())
    }

    fn clear_mempool(&self) -> Result<()> {
        self.write()?.mempool.clear();
        Ok(())
    }

    fn stored_difficulty(&self) -> Result<Option<u32>> {
        Ok(self.read()?.difficulty)
    }

    fn store_difficulty(&self, difficulty: u32) -> Result<()> {
        self.write()?.difficulty = Some(difficulty);
        Ok(())
    }
}
