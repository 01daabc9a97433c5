// Persistent ledger store backed by Sled
// I keep one database per node directory so several nodes can share a machine
// Keys are big-endian ids, so iterating a tree walks records in id order

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::LedgerStore;
use crate::utils::{deserialize, id_from_key, id_key, serialize};
use crate::wallet::Wallet;
use log::info;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, IVec, Tree};
use std::path::{Path, PathBuf};

const BLOCKS_TREE: &str = "blocks";
const TRANSACTIONS_TREE: &str = "transactions"; // mined transactions only
const MEMPOOL_TREE: &str = "mempool";
const WALLETS_TREE: &str = "wallets";
const WALLET_ADDRESSES_TREE: &str = "wallet_addresses"; // address -> wallet id
const META_TREE: &str = "meta";

const TRANSACTION_ID_KEY: &str = "last_transaction_id";
const WALLET_ID_KEY: &str = "last_wallet_id";
const DIFFICULTY_KEY: &str = "difficulty";

pub struct SledStore {
    db: Db,
    path: PathBuf,
    blocks: Tree,
    transactions: Tree,
    mempool: Tree,
    wallets: Tree,
    wallet_addresses: Tree,
    meta: Tree,
}

// Sled aborts carry a message; storage failures convert through From<sled::Error>
fn map_transaction_error(err: TransactionError<String>) -> BlockchainError {
    match err {
        TransactionError::Abort(msg) => BlockchainError::Database(msg),
        TransactionError::Storage(e) => BlockchainError::Database(e.to_string()),
    }
}

fn encode_transactions(block: &Block) -> Result<Vec<([u8; 8], Vec<u8>)>> {
    block
        .get_transactions()
        .iter()
        .map(|tx| Ok((id_key(tx.get_id()), serialize(tx)?)))
        .collect()
}

fn decode_all<T: bincode::Decode<()>>(tree: &Tree) -> Result<Vec<T>> {
    tree.iter()
        .values()
        .map(|value| deserialize(&value?))
        .collect()
}

fn keys_of(tree: &Tree) -> Result<Vec<IVec>> {
    Ok(tree.iter().keys().collect::<sled::Result<Vec<_>>>()?)
}

impl SledStore {
    pub fn open(path: &Path) -> Result<SledStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let store = SledStore {
            blocks: db.open_tree(BLOCKS_TREE)?,
            transactions: db.open_tree(TRANSACTIONS_TREE)?,
            mempool: db.open_tree(MEMPOOL_TREE)?,
            wallets: db.open_tree(WALLETS_TREE)?,
            wallet_addresses: db.open_tree(WALLET_ADDRESSES_TREE)?,
            meta: db.open_tree(META_TREE)?,
            path: path.to_path_buf(),
            db,
        };
        info!(
            "Opened ledger store at {} ({} blocks)",
            path.display(),
            store.blocks.len()
        );
        Ok(store)
    }

    pub fn get_path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn next_id(&self, counter: &str) -> Result<u64> {
        let updated = self.meta.update_and_fetch(counter, |old| {
            let last = old.and_then(|bytes| id_from_key(bytes).ok()).unwrap_or(0);
            Some(id_key(last + 1).to_vec())
        })?;
        match updated {
            Some(bytes) => id_from_key(&bytes),
            None => Err(BlockchainError::Database(format!(
                "Counter {counter} vanished during update"
            ))),
        }
    }

    // Never hand out an id at or below one already present in adopted data
    fn reserve_ids(&self, counter: &str, at_least: u64) -> Result<()> {
        self.meta.update_and_fetch(counter, |old| {
            let last = old.and_then(|bytes| id_from_key(bytes).ok()).unwrap_or(0);
            Some(id_key(last.max(at_least)).to_vec())
        })?;
        Ok(())
    }

    fn reserve_for_block(&self, block: &Block) -> Result<()> {
        if let Some(max) = block.get_transactions().iter().map(Transaction::get_id).max() {
            self.reserve_ids(TRANSACTION_ID_KEY, max)?;
        }
        Ok(())
    }
}

fn linked(block: &Block) -> Block {
    let mut block = block.clone();
    block.link_transactions();
    block
}

impl LedgerStore for SledStore {
    fn append_block(&self, block: &Block) -> Result<()> {
        let block = linked(block);
        let index = block.get_index();
        let key = id_key(index);
        let block_bytes = serialize(&block)?;
        let tx_entries = encode_transactions(&block)?;

        (&self.blocks, &self.transactions, &self.mempool)
            .transaction(|(blocks, transactions, mempool)| {
                if blocks.get(&key[..])?.is_some() {
                    return Err(ConflictableTransactionError::Abort(format!(
                        "Block {index} already exists"
                    )));
                }
                blocks.insert(&key[..], block_bytes.as_slice())?;
                for (tx_key, tx_bytes) in &tx_entries {
                    transactions.insert(&tx_key[..], tx_bytes.as_slice())?;
                    mempool.remove(&tx_key[..])?;
                }
                Ok(())
            })
            .map_err(map_transaction_error)?;

        self.reserve_for_block(&block)?;
        self.flush()
    }

    fn find_block(&self, index: u64) -> Result<Option<Block>> {
        match self.blocks.get(id_key(index))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update_block_with_transactions(&self, block: &Block) -> Result<()> {
        let block = linked(block);
        let index = block.get_index();
        let previous = self
            .find_block(index)?
            .ok_or_else(|| BlockchainError::not_found("block", index))?;
        let stale_keys: Vec<[u8; 8]> = previous
            .get_transactions()
            .iter()
            .map(|tx| id_key(tx.get_id()))
            .collect();
        let key = id_key(index);
        let block_bytes = serialize(&block)?;
        let tx_entries = encode_transactions(&block)?;

        (&self.blocks, &self.transactions)
            .transaction(|(blocks, transactions)| {
                for stale in &stale_keys {
                    transactions.remove(&stale[..])?;
                }
                blocks.insert(&key[..], block_bytes.as_slice())?;
                for (tx_key, tx_bytes) in &tx_entries {
                    transactions.insert(&tx_key[..], tx_bytes.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<String>>(())
            })
            .map_err(map_transaction_error)?;

        self.reserve_for_block(&block)?;
        self.flush()
    }

    fn delete_block(&self, index: u64) -> Result<()> {
        let Some(block) = self.find_block(index)? else {
            return Ok(());
        };
        let key = id_key(index);
        let tx_keys: Vec<[u8; 8]> = block
            .get_transactions()
            .iter()
            .map(|tx| id_key(tx.get_id()))
            .collect();

        (&self.blocks, &self.transactions)
            .transaction(|(blocks, transactions)| {
                blocks.remove(&key[..])?;
                for tx_key in &tx_keys {
                    transactions.remove(&tx_key[..])?;
                }
                Ok::<(), ConflictableTransactionError<String>>(())
            })
            .map_err(map_transaction_error)?;
        Ok(())
    }

    fn chain(&self) -> Result<Vec<Block>> {
        decode_all(&self.blocks)
    }

    fn tip(&self) -> Result<Option<Block>> {
        match self.blocks.last()? {
            Some((_, bytes)) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn last_non_genesis_blocks(&self, count: usize) -> Result<Vec<Block>> {
        let genesis_key = id_key(0);
        let mut recent = Vec::with_capacity(count);
        for entry in self.blocks.iter().rev() {
            if recent.len() == count {
                break;
            }
            let (key, bytes) = entry?;
            if key.as_ref() == genesis_key {
                continue;
            }
            recent.push(deserialize::<Block>(&bytes)?);
        }
        recent.reverse();
        Ok(recent)
    }

    fn block_count(&self) -> Result<u64> {
        Ok(self.blocks.len() as u64)
    }

    fn replace_chain(&self, chain: &[Block]) -> Result<()> {
        let adopted: Vec<Block> = chain.iter().map(linked).collect();
        let mut block_entries = Vec::with_capacity(adopted.len());
        let mut tx_entries = Vec::new();
        for block in &adopted {
            block_entries.push((id_key(block.get_index()), serialize(block)?));
            tx_entries.extend(encode_transactions(block)?);
        }

        // Callers hold the node lock, so nothing else writes these trees meanwhile
        let old_blocks = keys_of(&self.blocks)?;
        let old_transactions = keys_of(&self.transactions)?;
        let old_mempool = keys_of(&self.mempool)?;

        (&self.blocks, &self.transactions, &self.mempool)
            .transaction(|(blocks, transactions, mempool)| {
                for key in &old_blocks {
                    blocks.remove(key.as_ref())?;
                }
                for key in &old_transactions {
                    transactions.remove(key.as_ref())?;
                }
                for key in &old_mempool {
                    mempool.remove(key.as_ref())?;
                }
                for (key, bytes) in &block_entries {
                    blocks.insert(&key[..], bytes.as_slice())?;
                }
                for (key, bytes) in &tx_entries {
                    transactions.insert(&key[..], bytes.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<String>>(())
            })
            .map_err(map_transaction_error)?;

        for block in &adopted {
            self.reserve_for_block(block)?;
        }
        self.flush()
    }

    fn insert_wallet(&self, mut wallet: Wallet) -> Result<Wallet> {
        if self.wallet_addresses.contains_key(wallet.get_address())? {
            return Err(BlockchainError::Database(format!(
                "Wallet {} already registered",
                wallet.get_address()
            )));
        }
        let id = self.next_id(WALLET_ID_KEY)?;
        wallet.set_id(id);
        let key = id_key(id);
        let bytes = serialize(&wallet)?;
        let address = wallet.get_address().as_bytes().to_vec();

        (&self.wallets, &self.wallet_addresses)
            .transaction(|(wallets, addresses)| {
                wallets.insert(&key[..], bytes.as_slice())?;
                addresses.insert(address.as_slice(), &key[..])?;
                Ok::<(), ConflictableTransactionError<String>>(())
            })
            .map_err(map_transaction_error)?;
        self.flush()?;
        Ok(wallet)
    }

    fn find_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        match self.wallet_addresses.get(address)? {
            Some(id) => self.find_wallet_by_id(id_from_key(&id)?),
            None => Ok(None),
        }
    }

    fn find_wallet_by_id(&self, id: u64) -> Result<Option<Wallet>> {
        match self.wallets.get(id_key(id))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete_wallet(&self, id: u64) -> Result<()> {
        let Some(wallet) = self.find_wallet_by_id(id)? else {
            return Ok(());
        };
        let key = id_key(id);
        let address = wallet.get_address().as_bytes().to_vec();
        (&self.wallets, &self.wallet_addresses)
            .transaction(|(wallets, addresses)| {
                wallets.remove(&key[..])?;
                addresses.remove(address.as_slice())?;
                Ok::<(), ConflictableTransactionError<String>>(())
            })
            .map_err(map_transaction_error)?;
        Ok(())
    }

    fn list_wallets(&self) -> Result<Vec<Wallet>> {
        decode_all(&self.wallets)
    }

    fn next_transaction_id(&self) -> Result<u64> {
        self.next_id(TRANSACTION_ID_KEY)
    }

    fn find_transaction(&self, id: u64) -> Result<Option<Transaction>> {
        let key = id_key(id);
        if let Some(bytes) = self.transactions.get(key)? {
            return Ok(Some(deserialize(&bytes)?));
        }
        match self.mempool.get(key)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn transactions_for_address(&self, address: &str) -> Result<Vec<Transaction>> {
        let mut found: Vec<Transaction> = decode_all::<Transaction>(&self.transactions)?
            .into_iter()
            .chain(decode_all::<Transaction>(&self.mempool)?)
            .filter(|tx| tx.involves(address))
            .collect();
        found.sort_by_key(Transaction::get_id);
        Ok(found)
    }

    fn mempool(&self) -> Result<Vec<Transaction>> {
        decode_all(&self.mempool)
    }

    fn add_to_mempool(&self, mut tx: Transaction) -> Result<Transaction> {
        let id = self.next_id(TRANSACTION_ID_KEY)?;
        tx.set_id(id);
        tx.set_block_id(None);
        self.mempool.insert(id_key(id), serialize(&tx)?)?;
        Ok(tx)
    }

    fn remove_from_mempool(&self, ids: &[u64]) -> Result<()> {
        for id in ids {
            self.mempool.remove(id_key(*id))?;
        }
        Ok(())
    }

    fn clear_mempool(&self) -> Result<()> {
        self.mempool.clear()?;
        Ok(())
    }

    fn stored_difficulty(&self) -> Result<Option<u32>> {
        let Some(bytes) = self.meta.get(DIFFICULTY_KEY)? else {
            return Ok(None);
        };
        let raw: [u8; 4] = bytes.as_ref().try_into().map_err(|_| {
            BlockchainError::Database(format!("Corrupt difficulty entry of {} bytes", bytes.len()))
        })?;
        Ok(Some(u32::from_be_bytes(raw)))
    }

    fn store_difficulty(&self, difficulty: u32) -> Result<()> {
        self.meta
            .insert(DIFFICULTY_KEY, difficulty.to_be_bytes().to_vec())?;
        Ok(())
    }
}
