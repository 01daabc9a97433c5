//! Chain validation
//!
//! Every check here answers with a boolean or a rejection reason. Nothing in
//! this module returns an error: a malformed block coming from a peer is an
//! expected input, not a failure of the node.

use crate::core::{Block, GENESIS_PREVIOUS_HASH};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Why an external chain was not adopted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChainRejection {
    Empty,
    NotLonger { candidate: u64, current: u64 },
    InvalidGenesis,
    BadIndex { index: u64 },
    BrokenLink { index: u64 },
    BadDifficulty { index: u64 },
    BadSignature { index: u64 },
    BadProof { index: u64 },
    HashMismatch { index: u64 },
}

impl fmt::Display for ChainRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainRejection::Empty => write!(f, "candidate chain is empty"),
            ChainRejection::NotLonger { candidate, current } => write!(
                f,
                "candidate length {candidate} is not longer than local length {current}"
            ),
            ChainRejection::InvalidGenesis => write!(f, "genesis block is malformed or unsigned"),
            ChainRejection::BadIndex { index } => {
                write!(f, "block at position {index} carries the wrong index")
            }
            ChainRejection::BrokenLink { index } => {
                write!(f, "block {index} does not link to its predecessor")
            }
            ChainRejection::BadDifficulty { index } => {
                write!(f, "block {index} declares a difficulty below {MIN_BLOCK_DIFFICULTY}")
            }
            ChainRejection::BadSignature { index } => {
                write!(f, "block {index} has an invalid signature")
            }
            ChainRejection::BadProof { index } => {
                write!(f, "block {index} has an invalid proof-of-work")
            }
            ChainRejection::HashMismatch { index } => {
                write!(f, "block {index} hash does not match its contents")
            }
        }
    }
}

/// Per-block verdicts for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainValidationReport {
    /// Chain position -> valid, with everything after the first failure marked invalid
    pub valid_blocks: BTreeMap<u64, bool>,
    /// Chain position -> raw signature check, independent of earlier failures
    pub signature_validity: BTreeMap<u64, bool>,
    pub is_chain_valid: bool,
}

/// Every mined block after genesis has to carry at least this much work
pub const MIN_BLOCK_DIFFICULTY: u32 = 1;

/// Index 0, the sentinel predecessor, no transactions, and a signature over its true hash
pub fn is_genesis_valid(genesis: &Block) -> bool {
    genesis.get_index() == 0
        && genesis.get_previous_hash() == GENESIS_PREVIOUS_HASH
        && genesis.get_transactions().is_empty()
        && genesis.get_hash() == genesis.compute_hash()
        && genesis.verify()
}

pub fn is_block_valid(current: &Block, previous: &Block) -> bool {
    current.get_index() == previous.get_index() + 1
        && current.get_previous_hash() == previous.get_hash()
        && current.get_difficulty() >= MIN_BLOCK_DIFFICULTY
        && current.get_hash() == current.compute_hash()
        && current.verify()
        && current.hash_valid_proof()
}

/// An empty chain has no genesis and is never valid
pub fn is_chain_valid(chain: &[Block]) -> bool {
    let Some(genesis) = chain.first() else {
        return false;
    };
    is_genesis_valid(genesis) && chain.windows(2).all(|pair| is_block_valid(&pair[1], &pair[0]))
}

/// Full check of an untrusted chain, in the order the checks are reported.
/// Rejections name the position in the candidate, not the block's own index.
pub fn check_candidate(
    candidate: &[Block],
    current_length: u64,
) -> std::result::Result<(), ChainRejection> {
    let Some(genesis) = candidate.first() else {
        return Err(ChainRejection::Empty);
    };
    let candidate_length = candidate.len() as u64;
    if candidate_length <= current_length {
        return Err(ChainRejection::NotLonger {
            candidate: candidate_length,
            current: current_length,
        });
    }
    if !is_genesis_valid(genesis) {
        return Err(ChainRejection::InvalidGenesis);
    }

    for (position, pair) in candidate.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let index = position as u64 + 1;
        if current.get_index() != index {
            return Err(ChainRejection::BadIndex { index });
        }
        if current.get_previous_hash() != previous.get_hash() {
            return Err(ChainRejection::BrokenLink { index });
        }
        if current.get_difficulty() < MIN_BLOCK_DIFFICULTY {
            return Err(ChainRejection::BadDifficulty { index });
        }
        if !current.verify() {
            return Err(ChainRejection::BadSignature { index });
        }
        if !current.hash_valid_proof() {
            return Err(ChainRejection::BadProof { index });
        }
        if current.get_hash() != current.compute_hash() {
            return Err(ChainRejection::HashMismatch { index });
        }
    }
    Ok(())
}

pub fn validation_report(chain: &[Block]) -> ChainValidationReport {
    let mut valid_blocks = BTreeMap::new();
    let mut signature_validity = BTreeMap::new();
    let mut still_valid = !chain.is_empty();

    for (position, block) in chain.iter().enumerate() {
        let key = position as u64;
        signature_validity.insert(key, block.verify());
        let block_ok = if position == 0 {
            is_genesis_valid(block)
        } else {
            is_block_valid(block, &chain[position - 1])
        };
        still_valid = still_valid && block_ok;
        valid_blocks.insert(key, still_valid);
    }

    ChainValidationReport {
        valid_blocks,
        signature_validity,
        is_chain_valid: still_valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Amount, BlockEdit, Transaction};
    use crate::utils::generate_key_pair_hex;

    // Blocks keep their index private, so a forged one goes through the JSON form
    fn with_index(block: &Block, index: u64) -> Block {
        let mut value = serde_json::to_value(block).unwrap();
        value["index"] = serde_json::json!(index);
        serde_json::from_value(value).unwrap()
    }

    fn build_chain(length: usize) -> Vec<Block> {
        let (private_key, public_key) = generate_key_pair_hex().unwrap();
        let mut chain = vec![Block::generate_genesis_block(&private_key, &public_key).unwrap()];
        for index in 1..length as u64 {
            let coinbase = Transaction::new_coinbase(index, "ADDR_MINER", Amount::from_coins(1));
            let previous = chain.last().unwrap().get_hash().to_string();
            let mut block = Block::new_block(index, &previous, vec![coinbase], 1).unwrap();
            block.mine(1);
            block.sign(&private_key, &public_key).unwrap();
            block.mark_mined();
            chain.push(block);
        }
        chain
    }

    #[test]
    fn test_genesis_only_chain_is_valid() {
        assert!(is_chain_valid(&build_chain(1)));
    }

    #[test]
    fn test_empty_chain_is_invalid() {
        assert!(!is_chain_valid(&[]));
        assert!(!validation_report(&[]).is_chain_valid);
    }

    #[test]
    fn test_mined_chain_is_valid() {
        let chain = build_chain(4);
        assert!(is_chain_valid(&chain));
        assert_eq!(check_candidate(&chain, 3), Ok(()));
    }

    #[test]
    fn test_tampered_timestamp_invalidates_chain() {
        let mut chain = build_chain(4);
        chain[2].apply_edit(&BlockEdit {
            timestamp: Some(1),
            signature: None,
        });
        assert!(!is_chain_valid(&chain));
    }

    #[test]
    fn test_tampered_transaction_invalidates_chain() {
        let mut chain = build_chain(3);
        chain[1].transactions_mut()[0].set_amount(Amount::from_coins(1_000));
        assert!(!is_chain_valid(&chain));
        assert_eq!(
            check_candidate(&chain, 1),
            Err(ChainRejection::BadProof { index: 1 })
        );
    }

    #[test]
    fn test_forged_signature_reported() {
        let mut chain = build_chain(3);
        chain[2].apply_edit(&BlockEdit {
            timestamp: None,
            signature: Some("AAAA".to_string()),
        });
        assert_eq!(
            check_candidate(&chain, 1),
            Err(ChainRejection::BadSignature { index: 2 })
        );
    }

    #[test]
    fn test_length_rules() {
        let chain = build_chain(3);
        assert_eq!(check_candidate(&[], 0), Err(ChainRejection::Empty));
        assert_eq!(
            check_candidate(&chain, 3),
            Err(ChainRejection::NotLonger {
                candidate: 3,
                current: 3
            })
        );
        assert!(check_candidate(&chain, 4).is_err());
    }

    #[test]
    fn test_broken_link_detected() {
        let mut chain = build_chain(3);
        let foreign = build_chain(3);
        chain[2] = foreign[2].clone();
        assert_eq!(
            check_candidate(&chain, 1),
            Err(ChainRejection::BrokenLink { index: 2 })
        );
    }

    #[test]
    fn test_report_propagates_first_failure_downstream() {
        let mut chain = build_chain(5);
        chain[2].apply_edit(&BlockEdit {
            timestamp: Some(7),
            signature: None,
        });
        let report = validation_report(&chain);
        assert!(!report.is_chain_valid);
        assert!(report.valid_blocks[&0]);
        assert!(report.valid_blocks[&1]);
        assert!(!report.valid_blocks[&2]);
        assert!(!report.valid_blocks[&3]);
        assert!(!report.valid_blocks[&4]);
        // block 3 still carries a genuine signature even though it is unreachable
        assert!(report.signature_validity[&3]);
        assert!(!report.signature_validity[&2]);
    }

    #[test]
    fn test_genesis_contents_are_covered() {
        let mut chain = build_chain(2);
        chain[0]
            .transactions_mut()
            .push(Transaction::new_coinbase(0, "ADDR_THIEF", Amount::from_coins(1_000_000)));
        // the stored hash and its signature are untouched, only the contents changed
        assert!(chain[0].verify());
        assert!(!is_genesis_valid(&chain[0]));
        assert!(!is_chain_valid(&chain));
        assert_eq!(
            check_candidate(&chain, 1),
            Err(ChainRejection::InvalidGenesis)
        );
    }

    #[test]
    fn test_genesis_must_sit_at_index_zero() {
        let mut chain = build_chain(3);
        chain[0] = with_index(&chain[0], 5);
        assert_eq!(
            check_candidate(&chain, 1),
            Err(ChainRejection::InvalidGenesis)
        );
    }

    #[test]
    fn test_swapped_indices_rejected() {
        let mut chain = build_chain(3);
        chain[1] = with_index(&chain[1], 2);
        chain[2] = with_index(&chain[2], 1);
        // signatures and proofs still hold, only the numbering is wrong
        assert!(chain[1].verify() && chain[1].hash_valid_proof());
        assert!(!is_chain_valid(&chain));
        assert!(!is_block_valid(&chain[1], &chain[0]));
        assert_eq!(
            check_candidate(&chain, 2),
            Err(ChainRejection::BadIndex { index: 1 })
        );
    }

    #[test]
    fn test_duplicated_index_rejected() {
        let mut chain = build_chain(4);
        chain[3] = with_index(&chain[3], 2);
        assert_eq!(
            check_candidate(&chain, 1),
            Err(ChainRejection::BadIndex { index: 3 })
        );
        let report = validation_report(&chain);
        assert_eq!(report.valid_blocks.len(), 4);
        assert!(report.valid_blocks[&2]);
        assert!(!report.valid_blocks[&3]);
    }

    #[test]
    fn test_zero_difficulty_block_rejected() {
        let (private_key, public_key) = generate_key_pair_hex().unwrap();
        let genesis = Block::generate_genesis_block(&private_key, &public_key).unwrap();
        let coinbase = Transaction::new_coinbase(1, "ADDR_MINER", Amount::from_coins(1));
        let mut block = Block::new_block(1, genesis.get_hash(), vec![coinbase], 0).unwrap();
        block.mine(0);
        block.sign(&private_key, &public_key).unwrap();
        block.mark_mined();
        assert!(block.hash_valid_proof());

        let chain = vec![genesis, block];
        assert!(!is_chain_valid(&chain));
        assert_eq!(
            check_candidate(&chain, 1),
            Err(ChainRejection::BadDifficulty { index: 1 })
        );
    }
}
