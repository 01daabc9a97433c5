use crate::core::{Amount, Block, Transaction};
use std::collections::BTreeMap;

pub type Balances = BTreeMap<String, Amount>;

/// A point where replay drove a sender below zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overdraft {
    pub address: String,
    pub block_index: Option<u64>,
    pub balance: Amount,
}

/// Balances rebuilt by replaying transactions, recomputed from scratch on every call
///
/// Final balances are a plain sum, but the overdraft trail depends on the order
/// blocks are replayed in: spending before funding shows up as an overdraft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerProjection {
    balances: Balances,
    overdrafts: Vec<Overdraft>,
}

impl LedgerProjection {
    pub fn new() -> LedgerProjection {
        LedgerProjection::default()
    }

    pub fn replay_chain(chain: &[Block]) -> LedgerProjection {
        let mut projection = LedgerProjection::new();
        for block in chain {
            for tx in block.get_transactions() {
                projection.apply(tx, Some(block.get_index()));
            }
        }
        projection
    }

    /// Pending transactions are unordered, so they are applied after the chain
    pub fn overlay_mempool(&mut self, mempool: &[Transaction]) {
        for tx in mempool {
            self.apply(tx, None);
        }
    }

    pub fn apply(&mut self, tx: &Transaction, block_index: Option<u64>) {
        if !tx.is_coinbase() {
            let debit = tx.get_amount() + tx.get_fee();
            let sender = self
                .balances
                .entry(tx.get_from_address().to_string())
                .or_default();
            *sender -= debit;
            if sender.is_negative() {
                let balance = *sender;
                self.overdrafts.push(Overdraft {
                    address: tx.get_from_address().to_string(),
                    block_index,
                    balance,
                });
            }
        }
        *self
            .balances
            .entry(tx.get_to_address().to_string())
            .or_default() += tx.get_amount();
    }

    pub fn balance_of(&self, address: &str) -> Amount {
        self.balances.get(address).copied().unwrap_or_default()
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn into_balances(self) -> Balances {
        self.balances
    }

    pub fn overdrafts(&self) -> &[Overdraft] {
        &self.overdrafts
    }
}

pub fn compute_balances(chain: &[Block], mempool: Option<&[Transaction]>) -> Balances {
    let mut projection = LedgerProjection::replay_chain(chain);
    if let Some(pending) = mempool {
        projection.overlay_mempool(pending);
    }
    projection.into_balances()
}
