//! Core ledger functionality
//!
//! Blocks, transactions, proof-of-work, difficulty retuning, balance
//! projection, contract hooks, and the per-node engine that ties them together.

pub mod block;
pub mod contracts;
pub mod difficulty;
pub mod engine;
pub mod ledger;
pub mod monetary;
pub mod proof_of_work;
pub mod selection;
pub mod transaction;
pub mod validator;

pub use block::{Block, BlockEdit, GENESIS_PREVIOUS_HASH};
pub use contracts::{
    ContractAccount, PenaltyStakingContract, SmartContract, StakeRecord, StakeStatus,
    StakingContract, TimeLockContract,
};
pub use difficulty::DifficultyAdjustment;
pub use engine::{ContractInfo, NodeEngine, SyncOutcome, WalletOverview};
pub use ledger::{compute_balances, Balances, LedgerProjection, Overdraft};
pub use monetary::{block_reward, Amount, UNITS_PER_COIN};
pub use proof_of_work::{MiningTask, ProofOfWork};
pub use selection::{policy_from_settings, AllPending, HighestFeeFirst, SelectionPolicy};
pub use transaction::{Transaction, COINBASE_ADDRESS};
pub use validator::{
    check_candidate, is_block_valid, is_chain_valid, is_genesis_valid, validation_report,
    ChainRejection, ChainValidationReport,
};
