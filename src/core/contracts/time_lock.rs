use super::{same_address, ContractAccount, SmartContract};
use crate::core::{Block, Transaction};
use crate::error::Result;
use log::debug;

/// Funds held at the contract address cannot leave before `unlock_block_index`
pub struct TimeLockContract {
    account: ContractAccount,
    unlock_block_index: u64,
}

impl TimeLockContract {
    pub fn new(unlock_block_index: u64) -> Result<TimeLockContract> {
        Ok(TimeLockContract::with_account(
            ContractAccount::generate()?,
            unlock_block_index,
        ))
    }

    pub fn with_account(account: ContractAccount, unlock_block_index: u64) -> TimeLockContract {
        TimeLockContract {
            account,
            unlock_block_index,
        }
    }

    pub fn unlock_block_index(&self) -> u64 {
        self.unlock_block_index
    }
}

impl SmartContract for TimeLockContract {
    fn kind(&self) -> &'static str {
        "time-lock"
    }

    fn account(&self) -> &ContractAccount {
        &self.account
    }

    fn admits(&self, _chain: &[Block], tx: &Transaction, current_block: u64) -> bool {
        if !same_address(tx.get_from_address(), self.account.address()) {
            return true;
        }
        if current_block < self.unlock_block_index {
            debug!(
                "Time lock {} holds transfer until block {}, current block {current_block}",
                self.account.address(),
                self.unlock_block_index
            );
            return false;
        }
        true
    }

    fn validate(&mut self, chain: &[Block], tx: &mut Transaction, current_block: u64) -> bool {
        self.admits(chain, tx, current_block)
    }
}
