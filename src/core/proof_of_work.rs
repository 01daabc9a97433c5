use crate::core::Block;
use crate::error::{BlockchainError, Result};
use log::info;
use std::thread::{self, JoinHandle};

/// Nonce search for one block at a fixed difficulty
pub struct ProofOfWork {
    block: Block,
    difficulty: u32,
}

/// Proof-of-work running on its own thread
pub struct MiningTask {
    index: u64,
    handle: JoinHandle<Block>,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block, difficulty: u32) -> ProofOfWork {
        ProofOfWork { block, difficulty }
    }

    /// A hash meets the target when its hex form starts with `difficulty` zeros
    pub fn meets_target(hash: &str, difficulty: u32) -> bool {
        let difficulty = difficulty as usize;
        hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Validate the stored hash against the block's own difficulty
    pub fn validate(block: &Block) -> bool {
        block.hash_valid_proof()
    }

    pub fn run(self) -> Block {
        let ProofOfWork {
            mut block,
            difficulty,
        } = self;
        info!(
            "Starting proof-of-work for block {} with difficulty {difficulty}",
            block.get_index()
        );
        block.mine(difficulty);
        info!(
            "Proof-of-work completed for block {}: {} after {} ms (nonce {})",
            block.get_index(),
            block.get_hash(),
            block.get_mining_duration_ms(),
            block.get_nonce()
        );
        block
    }

    /// Move the search off the caller's thread
    pub fn spawn(self) -> MiningTask {
        let index = self.block.get_index();
        MiningTask {
            index,
            handle: thread::spawn(move || self.run()),
        }
    }
}

impl MiningTask {
    pub fn join(self) -> Result<Block> {
        self.handle.join().map_err(|_| {
            BlockchainError::Mining(format!("Mining thread for block {} panicked", self.index))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Amount, Transaction};

    fn create_test_block() -> Block {
        let coinbase = Transaction::new_coinbase(1, "ADDR_MINER", Amount::from_coins(1));
        Block::new_block(1, "PREV", vec![coinbase], 0).unwrap()
    }

    #[test]
    fn test_meets_target() {
        assert!(ProofOfWork::meets_target("00AB", 2));
        assert!(!ProofOfWork::meets_target("0AB0", 2));
        assert!(ProofOfWork::meets_target("ABCD", 0));
        assert!(!ProofOfWork::meets_target("0", 2));
    }

    #[test]
    fn test_run_produces_valid_proof() {
        let block = ProofOfWork::new_proof_of_work(create_test_block(), 2).run();
        assert!(ProofOfWork::validate(&block));
        assert!(block.get_hash().starts_with("00"));
    }

    #[test]
    fn test_spawned_search_joins_with_mined_block() {
        let task = ProofOfWork::new_proof_of_work(create_test_block(), 1).spawn();
        let block = task.join().unwrap();
        assert_eq!(block.get_difficulty(), 1);
        assert!(block.hash_valid_proof());
    }

    #[test]
    fn test_tampered_hash_fails_validation() {
        let block = ProofOfWork::new_proof_of_work(create_test_block(), 1).run();
        let mut json = serde_json::to_value(&block).unwrap();
        json["nonce"] = serde_json::json!(block.get_nonce() + 1);
        let tampered: Block = serde_json::from_value(json).unwrap();
        assert!(!ProofOfWork::validate(&tampered));
    }
}
