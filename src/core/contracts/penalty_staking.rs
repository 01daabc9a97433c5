use super::{
    accrued_reward, same_address, stake_key, ContractAccount, SmartContract, StakeRecord,
    StakeStatus,
};
use crate::core::{Amount, Block, Transaction};
use crate::error::Result;
use log::info;
use std::collections::HashMap;

/// Staking where leaving early is allowed but costs `early_penalty_percent` of the principal
pub struct PenaltyStakingContract {
    account: ContractAccount,
    reward_per_block_per_token: Amount,
    min_lock_blocks: u64,
    early_penalty_percent: Amount,
    stakes: HashMap<String, StakeRecord>,
    total_penalties_collected: Amount,
}

/// Payout split for a withdrawal at a given block
struct Settlement {
    payout: Amount,
    penalty: Amount,
    reward: Amount,
}

impl PenaltyStakingContract {
    pub fn new(
        reward_per_block_per_token: Amount,
        min_lock_blocks: u64,
        early_penalty_percent: Amount,
    ) -> Result<Self> {
        Ok(PenaltyStakingContract::with_account(
            ContractAccount::generate()?,
            reward_per_block_per_token,
            min_lock_blocks,
            early_penalty_percent,
        ))
    }

    pub fn with_account(
        account: ContractAccount,
        reward_per_block_per_token: Amount,
        min_lock_blocks: u64,
        early_penalty_percent: Amount,
    ) -> PenaltyStakingContract {
        PenaltyStakingContract {
            account,
            reward_per_block_per_token,
            min_lock_blocks,
            early_penalty_percent,
            stakes: HashMap::new(),
            total_penalties_collected: Amount::ZERO,
        }
    }

    pub fn total_penalties_collected(&self) -> Amount {
        self.total_penalties_collected
    }

    pub fn early_penalty_percent(&self) -> Amount {
        self.early_penalty_percent
    }

    pub fn stake_record(&self, user_address: &str) -> Option<&StakeRecord> {
        self.stakes
            .get(&stake_key(user_address))
            .filter(|r| r.principal.is_positive())
    }

    fn settle(&self, record: &StakeRecord, current_block: u64) -> Option<Settlement> {
        let held = current_block.saturating_sub(record.start_block);
        let reward = accrued_reward(record.principal, self.reward_per_block_per_token, held)?;
        if held < self.min_lock_blocks {
            let penalty = record.principal.checked_mul_rate(self.early_penalty_percent)?;
            let payout = record.principal.checked_sub(penalty)?.checked_add(reward)?;
            Some(Settlement {
                payout,
                penalty,
                reward,
            })
        } else {
            Some(Settlement {
                payout: record.principal.checked_add(reward)?,
                penalty: Amount::ZERO,
                reward,
            })
        }
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

    fn withdrawal_settlement(&self, tx: &Transaction, current_block: u64) -> Option<Settlement> {
        let record = self.stake_record(tx.get_to_address())?;
        if !tx.get_amount().is_positive() {
            return None;
        }
        let settlement = self.settle(record, current_block)?;
        (tx.get_amount() <= settlement.payout).then_some(settlement)
    }

    fn handle_deposit(&mut self, tx: &Transaction, current_block: u64) -> bool {
        if !self.accepts_deposit(tx) {
            return false;
        }
        let record = self
            .stakes
            .entry(stake_key(tx.get_from_address()))
            .or_default();
        if record.principal.is_zero() {
            record.start_block = current_block;
        }
        record.principal += tx.get_amount();
        true
    }

    fn handle_withdraw(&mut self, tx: &mut Transaction, current_block: u64) -> bool {
        let Some(settlement) = self.withdrawal_settlement(tx, current_block) else {
            return false;
        };

        if settlement.penalty.is_positive() {
            info!(
                "Early withdrawal by {} at block {current_block}, penalty {}",
                tx.get_to_address(),
                settlement.penalty
            );
        }
        self.total_penalties_collected += settlement.penalty;
        if let Some(record) = self.stakes.get_mut(&stake_key(tx.get_to_address())) {
            record.earned_reward = settlement.reward;
            record.principal = Amount::ZERO;
            record.start_block = 0;
        }
        tx.set_amount(settlement.payout);
        true
    }
}

impl SmartContract for PenaltyStakingContract {
    fn kind(&self) -> &'static str {
        "penalty-staking"
    }

    fn account(&self) -> &ContractAccount {
        &self.account
    }

    fn admits(&self, _chain: &[Block], tx: &Transaction, current_block: u64) -> bool {
        let address = self.account.address();
        if same_address(tx.get_to_address(), address) {
            self.accepts_deposit(tx)
        } else if same_address(tx.get_from_address(), address) {
            self.withdrawal_settlement(tx, current_block).is_some()
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
            current_payout: self.settle(record, current_block)?.payout,
            is_locked: held_blocks < self.min_lock_blocks,
        })
    }
}
