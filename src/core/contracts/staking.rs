use super::{
    accrued_reward, same_address, stake_key, ContractAccount, SmartContract, StakeRecord,
    StakeStatus,
};
use crate::core::{Amount, Block, Transaction};
use crate::error::Result;
use log::{debug, info};
use std::collections::HashMap;

/// Deposits earn `reward_per_block_per_token` per held block and cannot be
/// withdrawn before `lock_period_in_blocks` have passed
pub struct StakingContract {
    account: ContractAccount,
    reward_per_block_per_token: Amount,
    lock_period_in_blocks: u64,
    stakes: HashMap<String, StakeRecord>,
}

impl StakingContract {
    pub fn new(reward_per_block_per_token: Amount, lock_period_in_blocks: u64) -> Result<Self> {
        Ok(StakingContract::with_account(
            ContractAccount::generate()?,
            reward_per_block_per_token,
            lock_period_in_blocks,
        ))
    }

    pub fn with_account(
        account: ContractAccount,
        reward_per_block_per_token: Amount,
        lock_period_in_blocks: u64,
    ) -> StakingContract {
        StakingContract {
            account,
            reward_per_block_per_token,
            lock_period_in_blocks,
            stakes: HashMap::new(),
        }
    }

    pub fn stake_record(&self, user_address: &str) -> Option<&StakeRecord> {
        self.stakes.get(&stake_key(user_address))
    }

    fn payout(&self, record: &StakeRecord, current_block: u64) -> Option<Amount> {
        let held = current_block.saturating_sub(record.start_block);
        let reward = accrued_reward(record.principal, self.reward_per_block_per_token, held)?;
        record.principal.checked_add(reward)
    }

    fn accepts_deposit(&self, tx: &Transaction) -> bool {
        if !tx.get_amount().is_positive() {
            return false;
        }
        let held = self
            .stake_record(tx.get_from_address())
            .map_or(Amount::ZERO, |r| r.principal);
        held.checked_add(tx.get_amount()).is_some()
    }

    // The full payout owed for a withdrawal request, if the stake can be released now
    fn withdrawal_payout(&self, tx: &Transaction, current_block: u64) -> Option<Amount> {
        let record = self.stake_record(tx.get_to_address())?;
        if current_block < record.start_block.saturating_add(self.lock_period_in_blocks) {
            debug!(
                "Stake of {} is locked until block {}",
                tx.get_to_address(),
                record.start_block + self.lock_period_in_blocks
            );
            return None;
        }
        let payout = self.payout(record, current_block)?;
        (tx.get_amount() <= payout).then_some(payout)
    }

    fn handle_deposit(&mut self, tx: &Transaction, current_block: u64) -> bool {
        if !self.accepts_deposit(tx) {
            return false;
        }
        let record = self
            .stakes
            .entry(stake_key(tx.get_from_address()))
            .or_insert_with(|| StakeRecord {
                start_block: current_block,
                ..StakeRecord::default()
            });
        record.principal += tx.get_amount();
        true
    }

    fn handle_withdraw(&mut self, tx: &mut Transaction, current_block: u64) -> bool {
        let Some(payout) = self.withdrawal_payout(tx, current_block) else {
            return false;
        };
        info!(
            "Staking payout of {payout} to {} at block {current_block}",
            tx.get_to_address()
        );
        tx.set_amount(payout);
        self.stakes.remove(&stake_key(tx.get_to_address()));
        true
    }
}

impl SmartContract for StakingContract {
    fn kind(&self) -> &'static str {
        "staking"
    }

    fn account(&self) -> &ContractAccount {
        &self.account
    }

    fn admits(&self, _chain: &[Block], tx: &Transaction, current_block: u64) -> bool {
        let address = self.account.address();
        if same_address(tx.get_to_address(), address) {
            self.accepts_deposit(tx)
        } else if same_address(tx.get_from_address(), address) {
            self.withdrawal_payout(tx, current_block).is_some()
        } else {
            true
        }
    }

    fn validate(&mut self, _chain: &[Block], tx: &mut Transaction, current_block: u64) -> bool {
        let address = self.account.address();
        if same_address(tx.get_to_address(), address) {
            self.handle_deposit(tx, current_block)
        } else if same_address(tx.get_from_address(), address) {
            self.handle_withdraw(tx, current_block)
        } else {
            true
        }
    }

    fn stake_status(&self, user_address: &str, current_block: u64) -> Option<StakeStatus> {
        let record = self.stake_record(user_address)?;
        let held_blocks = current_block.saturating_sub(record.start_block);
        Some(StakeStatus {
            user_address: user_address.to_string(),
            principal: record.principal,
            start_block: record.start_block,
            held_blocks,
            current_payout: self.payout(record, current_block)?,
            is_locked: held_blocks < self.lock_period_in_blocks,
        })
    }
}
