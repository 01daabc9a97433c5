//! Smart-contract hooks
//!
//! Contracts sit between the mempool and the block being built. The miner first
//! asks every contract whether it admits a selected transaction; any contract
//! may veto it (it stays in the mempool). Only once all of them admit it does
//! each contract apply it in order, which may rewrite the amount to reflect a
//! payout. Ordinary business rejections are a `false` return, never an error.
//!
//! Transactions that neither credit nor debit a contract's address pass
//! through every variant untouched.

pub mod penalty_staking;
pub mod staking;
pub mod time_lock;

pub use penalty_staking::PenaltyStakingContract;
pub use staking::StakingContract;
pub use time_lock::TimeLockContract;

use crate::core::{Amount, Block, Transaction};
use crate::error::Result;
use crate::wallet::WalletKeys;
use serde::Serialize;

/// The contract's own ledger identity
#[derive(Debug, Clone)]
pub struct ContractAccount {
    keys: WalletKeys,
    address: String,
}

impl ContractAccount {
    pub fn generate() -> Result<ContractAccount> {
        let keys = WalletKeys::generate()?;
        let address = keys.address();
        Ok(ContractAccount { keys, address })
    }

    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    pub fn public_key(&self) -> &str {
        self.keys.public_key()
    }

    /// Payouts leave the contract address, so the contract signs them
    pub fn sign(&self, tx: &mut Transaction) -> Result<()> {
        tx.sign(self.keys.private_key())
    }
}

pub trait SmartContract: Send {
    fn kind(&self) -> &'static str;

    fn account(&self) -> &ContractAccount;

    fn address(&self) -> &str {
        self.account().address()
    }

    /// Read-only verdict on `tx` for block `current_block`, no state is touched
    fn admits(&self, chain: &[Block], tx: &Transaction, current_block: u64) -> bool;

    /// Accept, veto, or rewrite `tx` for inclusion in block `current_block`
    fn validate(&mut self, chain: &[Block], tx: &mut Transaction, current_block: u64) -> bool;

    fn stake_status(&self, _user_address: &str, _current_block: u64) -> Option<StakeStatus> {
        None
    }
}

/// Contract-local stake bookkeeping, lives as long as the contract instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StakeRecord {
    pub principal: Amount,
    pub start_block: u64,
    pub earned_reward: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakeStatus {
    pub user_address: String,
    pub principal: Amount,
    pub start_block: u64,
    pub held_blocks: u64,
    pub current_payout: Amount,
    pub is_locked: bool,
}

/// Contract addresses compare case-insensitively
pub(crate) fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

pub(crate) fn stake_key(address: &str) -> String {
    address.to_ascii_uppercase()
}

/// `principal * rate * held`, `None` on overflow
pub(crate) fn accrued_reward(principal: Amount, rate: Amount, held_blocks: u64) -> Option<Amount> {
    let held = i64::try_from(held_blocks).ok()?;
    principal.checked_mul_rate(rate)?.checked_mul_int(held)
}
