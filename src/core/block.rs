use crate::core::{ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, sha256_hex, sign_payload, verify_payload};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Previous-hash marker carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    index: u64,
    transactions: Vec<Transaction>,
    previous_hash: String,
    hash: String,
    timestamp: i64, // milliseconds since the epoch
    nonce: u64,
    difficulty: u32,
    mining_duration_ms: u64,
    signature: Option<String>,
    signer_public_key: Option<String>,
    is_mined: bool,
}

/// Fields the tamper demo is allowed to overwrite on a stored block
#[derive(Debug, Clone, Default)]
pub struct BlockEdit {
    pub timestamp: Option<i64>,
    pub signature: Option<String>,
}

impl Block {
    pub fn new_block(
        index: u64,
        previous_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Result<Block> {
        if index > 0 && previous_hash == GENESIS_PREVIOUS_HASH {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {index} must link to a real predecessor"
            )));
        }

        let mut block = Block {
            index,
            transactions,
            previous_hash: previous_hash.to_string(),
            hash: String::new(),
            timestamp: current_timestamp()?,
            nonce: 0,
            difficulty,
            mining_duration_ms: 0,
            signature: None,
            signer_public_key: None,
            is_mined: false,
        };
        block.hash = block.compute_hash();
        Ok(block)
    }

    /// Genesis is signed but never mined; only its signature and hash are checked
    pub fn generate_genesis_block(private_key: &str, public_key: &str) -> Result<Block> {
        let mut block = Block::new_block(0, GENESIS_PREVIOUS_HASH, Vec::new(), 0)?;
        block.sign(private_key, public_key)?;
        block.mark_mined();
        Ok(block)
    }

    /// SHA-256 over `previous|timestamp|nonce|difficulty|tx;tx;...` in upper-case hex
    pub fn compute_hash(&self) -> String {
        let transactions = self
            .transactions
            .iter()
            .map(Transaction::canonical_entry)
            .collect::<Vec<_>>()
            .join(";");
        let preimage = format!(
            "{}|{}|{}|{}|{}",
            self.previous_hash, self.timestamp, self.nonce, self.difficulty, transactions
        );
        sha256_hex(preimage.as_bytes())
    }

    /// Search nonces until the hash carries `difficulty` leading zeros
    pub fn mine(&mut self, difficulty: u32) {
        let started = Instant::now();
        self.difficulty = difficulty;
        self.hash = self.compute_hash();
        while !ProofOfWork::meets_target(&self.hash, difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = self.compute_hash();
        }
        self.mining_duration_ms = started.elapsed().as_millis() as u64;
    }

    pub fn sign(&mut self, private_key: &str, public_key: &str) -> Result<()> {
        self.signature = Some(sign_payload(&self.hash, private_key)?);
        self.signer_public_key = Some(public_key.to_string());
        Ok(())
    }

    pub fn verify(&self) -> bool {
        match (&self.signature, &self.signer_public_key) {
            (Some(signature), Some(public_key)) => verify_payload(&self.hash, signature, public_key),
            _ => false,
        }
    }

    pub fn hash_valid_proof(&self) -> bool {
        self.hash == self.compute_hash() && ProofOfWork::meets_target(&self.hash, self.difficulty)
    }

    pub fn mark_mined(&mut self) {
        self.is_mined = true;
    }

    /// Point every transaction at this block
    pub fn link_transactions(&mut self) {
        let index = self.index;
        for tx in &mut self.transactions {
            tx.set_block_id(Some(index));
        }
    }

    /// Overwrite stored fields without re-mining; the hash follows data edits
    pub fn apply_edit(&mut self, edit: &BlockEdit) {
        if let Some(timestamp) = edit.timestamp {
            self.timestamp = timestamp;
            self.hash = self.compute_hash();
        }
        if let Some(signature) = &edit.signature {
            self.signature = Some(signature.clone());
        }
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_mining_duration_ms(&self) -> u64 {
        self.mining_duration_ms
    }

    pub fn get_signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn get_signer_public_key(&self) -> Option<&str> {
        self.signer_public_key.as_deref()
    }

    pub fn is_mined(&self) -> bool {
        self.is_mined
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Construct a block with arbitrary timing data (for testing only)
    #[cfg(test)]
    pub fn new_test_block(index: u64, previous_hash: &str, mining_duration_ms: u64) -> Block {
        let mut block = Block {
            index,
            transactions: Vec::new(),
            previous_hash: previous_hash.to_string(),
            hash: String::new(),
            timestamp: 1_700_000_000_000 + index as i64,
            nonce: 0,
            difficulty: 1,
            mining_duration_ms,
            signature: None,
            signer_public_key: None,
            is_mined: true,
        };
        block.hash = block.compute_hash();
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Amount;
    use crate::utils::generate_key_pair_hex;

    fn sample_block() -> Block {
        let tx = Transaction::new_coinbase(1, "ADDR_MINER", Amount::from_coins(1));
        Block::new_block(1, "PREV", vec![tx], 2).unwrap()
    }

    #[test]
    fn test_compute_hash_is_deterministic() {
        let block = sample_block();
        assert_eq!(block.compute_hash(), block.compute_hash());
        assert_eq!(block.get_hash(), block.compute_hash());
        assert_eq!(block.get_hash().len(), 64);
        assert!(block.get_hash().chars().all(|c| !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_hash_covers_transactions() {
        let mut block = sample_block();
        let before = block.compute_hash();
        block.transactions_mut()[0].set_amount(Amount::from_coins(50));
        assert_ne!(before, block.compute_hash());
    }

    #[test]
    fn test_mine_meets_target() {
        let mut block = sample_block();
        block.mine(2);
        assert!(block.get_hash().starts_with("00"));
        assert!(block.hash_valid_proof());
        assert_eq!(block.get_difficulty(), 2);
    }

    #[test]
    fn test_sign_and_verify() {
        let (private_key, public_key) = generate_key_pair_hex().unwrap();
        let mut block = sample_block();
        block.mine(1);
        assert!(!block.verify());
        block.sign(&private_key, &public_key).unwrap();
        assert!(block.verify());
    }

    #[test]
    fn test_verify_fails_for_other_key_or_changed_hash() {
        let (private_key, public_key) = generate_key_pair_hex().unwrap();
        let (_, other_public) = generate_key_pair_hex().unwrap();
        let mut block = sample_block();
        block.mine(1);
        block.sign(&private_key, &other_public).unwrap();
        assert!(!block.verify());

        block.sign(&private_key, &public_key).unwrap();
        block.apply_edit(&BlockEdit {
            timestamp: Some(42),
            signature: None,
        });
        assert!(!block.verify());
    }

    #[test]
    fn test_genesis_block() {
        let (private_key, public_key) = generate_key_pair_hex().unwrap();
        let genesis = Block::generate_genesis_block(&private_key, &public_key).unwrap();
        assert!(genesis.is_genesis());
        assert!(genesis.is_mined());
        assert_eq!(genesis.get_previous_hash(), GENESIS_PREVIOUS_HASH);
        assert!(genesis.get_transactions().is_empty());
        assert!(genesis.verify());
        assert_eq!(genesis.get_hash(), genesis.compute_hash());
    }

    #[test]
    fn test_non_genesis_needs_predecessor() {
        assert!(Block::new_block(3, GENESIS_PREVIOUS_HASH, Vec::new(), 1).is_err());
    }

    #[test]
    fn test_link_transactions() {
        let mut block = sample_block();
        block.link_transactions();
        assert!(block
            .get_transactions()
            .iter()
            .all(|tx| tx.get_block_id() == Some(1)));
    }
}
