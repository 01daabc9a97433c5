use crate::config::{ChainSettings, SelectionMode};
use crate::core::Transaction;
use std::cmp::Reverse;

/// Picks which pending transactions go into the next block
pub trait SelectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, pending: Vec<Transaction>) -> Vec<Transaction>;
}

/// Everything in the mempool, oldest first
#[derive(Debug, Clone, Copy, Default)]
pub struct AllPending;

impl SelectionPolicy for AllPending {
    fn name(&self) -> &'static str {
        "all-pending"
    }

    fn select(&self, mut pending: Vec<Transaction>) -> Vec<Transaction> {
        pending.sort_by_key(Transaction::get_id);
        pending
    }
}

/// Largest fees first, up to `cap` transactions; equal fees keep arrival order
#[derive(Debug, Clone, Copy)]
pub struct HighestFeeFirst {
    pub cap: usize,
}

impl SelectionPolicy for HighestFeeFirst {
    fn name(&self) -> &'static str {
        "highest-fee-first"
    }

    fn select(&self, mut pending: Vec<Transaction>) -> Vec<Transaction> {
        pending.sort_by_key(|tx| (Reverse(tx.get_fee()), tx.get_id()));
        pending.truncate(self.cap);
        pending
    }
}

pub fn policy_from_settings(settings: &ChainSettings) -> Box<dyn SelectionPolicy> {
    match settings.selection {
        SelectionMode::AllPending => Box::new(AllPending),
        SelectionMode::HighestFeeFirst => Box::new(HighestFeeFirst {
            cap: settings.max_block_transactions,
        }),
    }
}
