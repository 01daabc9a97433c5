// This is the per-node engine - admission, mining and consensus for one roster member
// I serialize every state-changing operation behind one mutex per node
// Reads (chain, balances, wallets) go straight to the store without taking the lock

use crate::config::ChainSettings;
use crate::core::contracts::{SmartContract, StakeStatus};
use crate::core::ledger::{Balances, LedgerProjection};
use crate::core::monetary::block_reward;
use crate::core::selection::{policy_from_settings, SelectionPolicy};
use crate::core::validator::{self, ChainRejection, ChainValidationReport};
use crate::core::{Amount, Block, BlockEdit, DifficultyAdjustment, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::LedgerStore;
use crate::wallet::{derive_address, Wallet, WalletKeys};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Result of offering a foreign chain to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Adopted { length: u64 },
    Rejected(ChainRejection),
}

impl SyncOutcome {
    pub fn is_adopted(&self) -> bool {
        matches!(self, SyncOutcome::Adopted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletOverview {
    pub wallet: Wallet,
    pub balance: Amount,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractInfo {
    pub kind: &'static str,
    pub address: String,
}

// Everything guarded by the node lock besides the store itself
struct EngineState {
    contracts: Vec<Box<dyn SmartContract>>,
    policy: Box<dyn SelectionPolicy>,
}

pub struct NodeEngine {
    name: String,
    keys: WalletKeys,
    store: Arc<dyn LedgerStore>,
    settings: ChainSettings,
    adjuster: DifficultyAdjustment,
    state: Mutex<EngineState>,
    difficulty: AtomicU32,
    average_mining_ms: AtomicU64,
}

fn sync_failure(err: BlockchainError) -> BlockchainError {
    BlockchainError::SyncFailure(err.to_string())
}

impl NodeEngine {
    // When I bring a node up I take the recorded difficulty, then the tip's, then the settings
    pub fn new(
        name: &str,
        keys: WalletKeys,
        store: Arc<dyn LedgerStore>,
        settings: ChainSettings,
    ) -> Result<NodeEngine> {
        settings.validate()?;
        let adjuster = DifficultyAdjustment::from_settings(&settings);

        let difficulty = match (store.stored_difficulty()?, store.tip()?) {
            (Some(recorded), _) => adjuster.clamp(recorded),
            (None, Some(tip)) if !tip.is_genesis() => adjuster.clamp(tip.get_difficulty()),
            _ => settings.initial_difficulty,
        };
        let window = adjuster.get_adjustment_period() as usize;
        let durations: Vec<u64> = store
            .last_non_genesis_blocks(window)?
            .iter()
            .map(Block::get_mining_duration_ms)
            .collect();
        let average = DifficultyAdjustment::average_duration_ms(&durations).unwrap_or(0.0);

        let engine = NodeEngine {
            name: name.to_string(),
            state: Mutex::new(EngineState {
                contracts: Vec::new(),
                policy: policy_from_settings(&settings),
            }),
            keys,
            store,
            settings,
            adjuster,
            difficulty: AtomicU32::new(difficulty),
            average_mining_ms: AtomicU64::new(average as u64),
        };
        engine.register_wallet(engine.keys.public_key(), &format!("node {name}"))?;
        info!(
            "Node {} ready at {} with difficulty {difficulty}",
            engine.name,
            engine.address()
        );
        Ok(engine)
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        match self.state.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => {
                error!("Failed to acquire lock on node {}", self.name);
                Err(BlockchainError::Mining(format!(
                    "node {} lock poisoned",
                    self.name
                )))
            }
        }
    }

    pub fn node_name(&self) -> &str {
        self.name.as_str()
    }

    pub fn address(&self) -> String {
        self.keys.address()
    }

    pub fn public_key(&self) -> &str {
        self.keys.public_key()
    }

    pub fn node_keys(&self) -> &WalletKeys {
        &self.keys
    }

    pub fn get_settings(&self) -> &ChainSettings {
        &self.settings
    }

    /// Create and store a genesis block signed by this node unless the store already has one
    pub fn ensure_genesis(&self) -> Result<Block> {
        let _guard = self.lock()?;
        if let Some(genesis) = self.store.find_block(0)? {
            return Ok(genesis);
        }
        let genesis =
            Block::generate_genesis_block(self.keys.private_key(), self.keys.public_key())?;
        self.store.append_block(&genesis)?;
        info!("Node {} created genesis block {}", self.name, genesis.get_hash());
        Ok(genesis)
    }

    // Wallets

    /// Registering the same public key twice returns the existing wallet
    pub fn register_wallet(&self, public_key: &str, display_name: &str) -> Result<Wallet> {
        let address = derive_address(public_key);
        if let Some(existing) = self.store.find_wallet_by_address(&address)? {
            return Ok(existing);
        }
        let wallet = self
            .store
            .insert_wallet(Wallet::new(public_key, display_name)?)?;
        debug!("Node {} registered wallet {address}", self.name);
        Ok(wallet)
    }

    pub fn create_wallet(&self, display_name: &str) -> Result<(Wallet, WalletKeys)> {
        let keys = WalletKeys::generate()?;
        let wallet = self.register_wallet(keys.public_key(), display_name)?;
        Ok((wallet, keys))
    }

    pub fn find_wallet(&self, address: &str) -> Result<Wallet> {
        self.store
            .find_wallet_by_address(address)?
            .ok_or_else(|| BlockchainError::not_found("wallet", address))
    }

    pub fn list_wallets(&self) -> Result<Vec<Wallet>> {
        self.store.list_wallets()
    }

    pub fn wallet_overview(&self, id: u64) -> Result<WalletOverview> {
        let wallet = self
            .store
            .find_wallet_by_id(id)?
            .ok_or_else(|| BlockchainError::not_found("wallet", id))?;
        let balance = self.wallet_balance(wallet.get_address())?;
        let transactions = self.store.transactions_for_address(wallet.get_address())?;
        Ok(WalletOverview {
            wallet,
            balance,
            transactions,
        })
    }

    /// Confirmed balance, mempool excluded
    pub fn wallet_balance(&self, address: &str) -> Result<Amount> {
        Ok(self.ledger_projection(false)?.balance_of(address))
    }

    // Transactions

    // I check affordability and signature inside the lock so two spends cannot both pass
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Transaction> {
        tx.validate_amounts()?;
        let _guard = self.lock()?;

        if tx.is_coinbase() {
            return self.store.add_to_mempool(tx);
        }

        let sender = self
            .store
            .find_wallet_by_address(tx.get_from_address())?
            .ok_or_else(|| BlockchainError::not_found("wallet", tx.get_from_address()))?;

        let required = tx.total_debit()?;
        let available = self.ledger_projection(true)?.balance_of(tx.get_from_address());
        if available < required {
            return Err(BlockchainError::InsufficientFunds {
                required,
                available,
            });
        }

        if !tx.verify_signature(sender.get_public_key()) {
            return Err(BlockchainError::InvalidSignature(format!(
                "transaction from {} does not verify against its sender key",
                tx.get_from_address()
            )));
        }

        let stored = self.store.add_to_mempool(tx)?;
        info!(
            "Node {} accepted transaction {}: {} -> {} ({})",
            self.name,
            stored.get_id(),
            stored.get_from_address(),
            stored.get_to_address(),
            stored.get_amount()
        );
        Ok(stored)
    }

    pub fn mempool(&self) -> Result<Vec<Transaction>> {
        self.store.mempool()
    }

    // Mining

    // This is the whole mining round: select, run contracts, coinbase, PoW, retune, sign, persist
    pub fn mine_pending(&self, miner_private_key: &str) -> Result<Block> {
        let miner = WalletKeys::from_private_key(miner_private_key)?;
        let miner_address = miner.address();

        let mut guard = self.lock()?;
        let state = &mut *guard;

        if self.store.find_wallet_by_address(&miner_address)?.is_none() {
            return Err(BlockchainError::not_found("wallet", miner_address));
        }
        let tip = self.store.tip()?.ok_or_else(|| {
            BlockchainError::Mining(format!("node {} has no genesis block", self.name))
        })?;
        let index = tip.get_index() + 1;

        let chain = self.store.chain()?;
        let selected = state.policy.select(self.store.mempool()?);
        let mut included = Vec::with_capacity(selected.len());
        for mut tx in selected {
            // Every veto is heard before any contract records a deposit or releases a stake
            if let Some(vetoing) = state
                .contracts
                .iter()
                .find(|c| !c.admits(&chain, &tx, index))
            {
                debug!(
                    "Contract {} held back transaction {} at block {index}",
                    vetoing.kind(),
                    tx.get_id()
                );
                continue;
            }
            let mut accepted = true;
            for contract in state.contracts.iter_mut() {
                let requested = tx.get_amount();
                if !contract.validate(&chain, &mut tx, index) {
                    warn!(
                        "Contract {} refused transaction {} after admitting it",
                        contract.kind(),
                        tx.get_id()
                    );
                    accepted = false;
                    break;
                }
                // A rewritten payout leaves the contract address, so the contract re-signs it
                if tx.get_amount() != requested {
                    contract.account().sign(&mut tx)?;
                }
            }
            if accepted {
                included.push(tx);
            }
        }

        let fees: Amount = included.iter().map(Transaction::get_fee).sum();
        let reward = block_reward(
            index,
            self.settings.base_reward,
            self.settings.halving_interval,
        );
        let coinbase_amount = reward.checked_add(fees).ok_or_else(|| {
            BlockchainError::Mining(format!("coinbase overflow at block {index}"))
        })?;
        let coinbase = Transaction::new_coinbase(
            self.store.next_transaction_id()?,
            &miner_address,
            coinbase_amount,
        );
        let included_ids: Vec<u64> = included.iter().map(Transaction::get_id).collect();

        let mut transactions = Vec::with_capacity(included.len() + 1);
        transactions.push(coinbase);
        transactions.extend(included);

        let difficulty = self.difficulty();
        let candidate = Block::new_block(index, tip.get_hash(), transactions, difficulty)?;
        let mut block = ProofOfWork::new_proof_of_work(candidate, difficulty)
            .spawn()
            .join()?;

        self.retune_difficulty(&block)?;

        block.sign(miner.private_key(), miner.public_key())?;
        block.mark_mined();
        self.store.append_block(&block)?;
        self.store.remove_from_mempool(&included_ids)?;
        block.link_transactions();

        info!(
            "Node {} mined block {} with {} transactions, reward {reward}, fees {fees}",
            self.name,
            index,
            included_ids.len()
        );
        Ok(block)
    }

    /// Mine with this node's own key
    pub fn mine(&self) -> Result<Block> {
        self.mine_pending(self.keys.private_key())
    }

    // The new block is not stored yet, so it is added to the window by hand
    fn retune_difficulty(&self, new_block: &Block) -> Result<()> {
        let block_count = self.store.block_count()? + 1;
        let window = self.adjuster.get_adjustment_period() as usize;
        let mut durations: Vec<u64> = self
            .store
            .last_non_genesis_blocks(window.saturating_sub(1))?
            .iter()
            .map(Block::get_mining_duration_ms)
            .collect();
        durations.push(new_block.get_mining_duration_ms());

        if let Some(average) = DifficultyAdjustment::average_duration_ms(&durations) {
            self.average_mining_ms
                .store(average as u64, Ordering::Relaxed);
        }

        let current = self.difficulty();
        let next = self
            .adjuster
            .calculate_next_difficulty(current, block_count, &durations);
        if next != current {
            self.store.store_difficulty(next)?;
            self.difficulty.store(next, Ordering::Relaxed);
        }
        Ok(())
    }

    // Consensus

    // I only swap chains after the whole candidate checks out, and never for a tie
    pub fn try_adopt_external_chain(&self, candidate: &[Block]) -> Result<SyncOutcome> {
        let _guard = self.lock()?;
        let current_length = self.store.block_count().map_err(sync_failure)?;

        if let Err(reason) = validator::check_candidate(candidate, current_length) {
            warn!("Node {} rejected external chain: {reason}", self.name);
            return Ok(SyncOutcome::Rejected(reason));
        }

        self.store.replace_chain(candidate).map_err(sync_failure)?;
        let length = candidate.len() as u64;
        info!("Node {} adopted external chain of length {length}", self.name);
        Ok(SyncOutcome::Adopted { length })
    }

    // Queries

    pub fn chain(&self) -> Result<Vec<Block>> {
        self.store.chain()
    }

    pub fn chain_length(&self) -> Result<u64> {
        self.store.block_count()
    }

    pub fn get_block(&self, index: u64) -> Result<Block> {
        self.store
            .find_block(index)?
            .ok_or_else(|| BlockchainError::not_found("block", index))
    }

    pub fn last_block(&self) -> Result<Block> {
        self.store
            .tip()?
            .ok_or_else(|| BlockchainError::not_found("block", "tip"))
    }

    pub fn find_transaction(&self, id: u64) -> Result<Transaction> {
        self.store
            .find_transaction(id)?
            .ok_or_else(|| BlockchainError::not_found("transaction", id))
    }

    pub fn ledger_projection(&self, include_mempool: bool) -> Result<LedgerProjection> {
        let mut projection = LedgerProjection::replay_chain(&self.store.chain()?);
        if include_mempool {
            projection.overlay_mempool(&self.store.mempool()?);
        }
        Ok(projection)
    }

    pub fn compute_balances(&self, include_mempool: bool) -> Result<Balances> {
        Ok(self.ledger_projection(include_mempool)?.into_balances())
    }

    pub fn is_chain_valid(&self) -> Result<bool> {
        Ok(validator::is_chain_valid(&self.store.chain()?))
    }

    pub fn validation_report(&self) -> Result<ChainValidationReport> {
        Ok(validator::validation_report(&self.store.chain()?))
    }

    /// Overwrite fields of a stored block in place, without re-mining or re-signing
    pub fn edit_block(&self, index: u64, edit: &BlockEdit) -> Result<Block> {
        let _guard = self.lock()?;
        let mut block = self
            .store
            .find_block(index)?
            .ok_or_else(|| BlockchainError::not_found("block", index))?;
        block.apply_edit(edit);
        self.store.update_block_with_transactions(&block)?;
        warn!("Node {} block {index} was edited in place", self.name);
        Ok(block)
    }

    // Difficulty

    pub fn difficulty(&self) -> u32 {
        self.difficulty.load(Ordering::Relaxed)
    }

    /// Returns the difficulty actually applied after clamping; it is recorded in the store
    pub fn set_difficulty(&self, difficulty: u32) -> Result<u32> {
        let clamped = self.adjuster.clamp(difficulty);
        self.store.store_difficulty(clamped)?;
        self.difficulty.store(clamped, Ordering::Relaxed);
        info!("Node {} difficulty set to {clamped}", self.name);
        Ok(clamped)
    }

    pub fn average_mining_time_ms(&self) -> u64 {
        self.average_mining_ms.load(Ordering::Relaxed)
    }

    // Contracts and selection

    /// Contracts run in the order they were added; the contract's own wallet is registered here
    pub fn add_contract(&self, contract: Box<dyn SmartContract>) -> Result<ContractInfo> {
        let info = ContractInfo {
            kind: contract.kind(),
            address: contract.address().to_string(),
        };
        self.register_wallet(
            contract.account().public_key(),
            &format!("{} contract", info.kind),
        )?;
        self.lock()?.contracts.push(contract);
        info!(
            "Node {} installed {} contract at {}",
            self.name, info.kind, info.address
        );
        Ok(info)
    }

    pub fn contracts(&self) -> Result<Vec<ContractInfo>> {
        Ok(self
            .lock()?
            .contracts
            .iter()
            .map(|c| ContractInfo {
                kind: c.kind(),
                address: c.address().to_string(),
            })
            .collect())
    }

    pub fn set_selection_policy(&self, policy: Box<dyn SelectionPolicy>) -> Result<()> {
        let mut state = self.lock()?;
        info!(
            "Node {} selection policy {} -> {}",
            self.name,
            state.policy.name(),
            policy.name()
        );
        state.policy = policy;
        Ok(())
    }

    /// Stake as it would settle in the next block
    pub fn stake_status(
        &self,
        contract_address: &str,
        user_address: &str,
    ) -> Result<Option<StakeStatus>> {
        let next_block = self.store.block_count()?;
        let state = self.lock()?;
        let contract = state
            .contracts
            .iter()
            .find(|c| c.address().eq_ignore_ascii_case(contract_address))
            .ok_or_else(|| BlockchainError::not_found("contract", contract_address))?;
        Ok(contract.stake_status(user_address, next_block))
    }
}
