//! # Roster Chain - a permissioned multi-node ledger
//!
//! A small fixed roster of nodes (A, B, C) each keeps its own copy of a hash
//! chain. Clients submit signed transfers, a node mines them into a block with
//! proof-of-work, and siblings adopt the new chain only if it is longer and
//! every block in it checks out.
//!
//! ## What is in here
//! - **Ledger**: account balances replayed from the chain, no UTXO set
//! - **Mining**: proof-of-work on a worker thread, adaptive difficulty, halving rewards
//! - **Consensus**: longest valid chain wins, ties keep the local chain
//! - **Contracts**: time-lock, staking and penalty-staking hooks run at block assembly
//! - **Storage**: in-memory for simulations, sled for per-node persistence
//!
//! ## Layout
//! - `core/`: blocks, transactions, validation, contracts, the node engine
//! - `network/`: the node roster and chain broadcast
//! - `storage/`: the `LedgerStore` contract and its two backends
//! - `wallet/`: addresses, key pairs, the local keystore
//! - `config/`: `ChainSettings` from TOML and the environment
//! - `utils/`: hashing, signing, encoding helpers
//! - `cli/`: command-line parsing for the binary

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{ChainSettings, SelectionMode};
pub use core::{
    Amount, Block, BlockEdit, ChainRejection, ChainValidationReport, NodeEngine, SmartContract,
    SyncOutcome, Transaction, WalletOverview, COINBASE_ADDRESS,
};
pub use error::{BlockchainError, Result};
pub use network::{BroadcastReport, NodeName, PeerSync, Roster};
pub use storage::{LedgerStore, MemoryStore, SledStore};
pub use utils::{current_timestamp, generate_key_pair_hex, sha256_digest, sign_payload, verify_payload};
pub use wallet::{derive_address, validate_address, Keystore, Wallet, WalletKeys, KEYSTORE_FILE};
