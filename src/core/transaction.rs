// This file implements transactions - how value moves between addresses in my ledger
// I use an account model here: a transaction simply debits `from` and credits `to`
// Balances are never stored, they are replayed from the chain (see ledger.rs)

use crate::core::Amount;
use crate::error::{BlockchainError, Result};
use crate::utils::{sign_payload, verify_payload};
use serde::{Deserialize, Serialize};

// Synthetic sender for miner rewards, exempt from balance and signature checks
pub const COINBASE_ADDRESS: &str = "COINBASE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: u64, // Assigned by the store when the transaction enters the mempool
    from_address: String,
    to_address: String,
    amount: Amount,
    fee: Amount,
    signature: String, // Base64 signature over the canonical payload
    note: Option<String>,
    block_id: Option<u64>, // None while the transaction waits in the mempool
}

impl Transaction {
    // When a client builds a transfer (unsigned, id assigned later)
    pub fn new(from: &str, to: &str, amount: Amount, fee: Amount) -> Transaction {
        Transaction {
            id: 0,
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount,
            fee,
            signature: String::new(),
            note: None,
            block_id: None,
        }
    }

    // When a client wants a ready-to-submit transfer in one step
    pub fn new_signed(
        from: &str,
        to: &str,
        amount: Amount,
        fee: Amount,
        private_key: &str,
    ) -> Result<Transaction> {
        let mut tx = Transaction::new(from, to, amount, fee);
        tx.sign(private_key)?;
        Ok(tx)
    }

    // The miner's reward: block reward plus the fees of everything it included
    pub fn new_coinbase(id: u64, to: &str, reward: Amount) -> Transaction {
        Transaction {
            id,
            from_address: COINBASE_ADDRESS.to_string(),
            to_address: to.to_string(),
            amount: reward,
            fee: Amount::ZERO,
            signature: String::new(),
            note: Some("block reward".to_string()),
            block_id: None,
        }
    }

    pub fn with_note(mut self, note: &str) -> Transaction {
        self.note = Some(note.to_string());
        self
    }

    // I sign exactly these four fields, so tampering with any of them breaks the signature
    pub fn canonical_payload(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.from_address, self.to_address, self.amount, self.fee
        )
    }

    // What a block hashes for each of its transactions
    pub fn canonical_entry(&self) -> String {
        format!("{}|{}", self.canonical_payload(), self.signature)
    }

    pub fn sign(&mut self, private_key: &str) -> Result<()> {
        self.signature = sign_payload(&self.canonical_payload(), private_key)?;
        Ok(())
    }

    pub fn verify_signature(&self, public_key: &str) -> bool {
        !self.signature.is_empty()
            && verify_payload(&self.canonical_payload(), &self.signature, public_key)
    }

    // Amount plus fee, what the sender has to be able to cover
    pub fn total_debit(&self) -> Result<Amount> {
        self.amount.checked_add(self.fee).ok_or_else(|| {
            BlockchainError::Transaction("Amount plus fee overflows".to_string())
        })
    }

    pub fn validate_amounts(&self) -> Result<()> {
        if self.amount.is_negative() {
            return Err(BlockchainError::Transaction(format!(
                "Amount must not be negative, got {}",
                self.amount
            )));
        }
        if self.fee.is_negative() {
            return Err(BlockchainError::Transaction(format!(
                "Fee must not be negative, got {}",
                self.fee
            )));
        }
        Ok(())
    }

    pub fn is_coinbase(&self) -> bool {
        self.from_address == COINBASE_ADDRESS
    }

    pub fn involves(&self, address: &str) -> bool {
        self.from_address == address || self.to_address == address
    }

    pub fn get_id(&self) -> u64 {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn get_from_address(&self) -> &str {
        self.from_address.as_str()
    }

    pub fn get_to_address(&self) -> &str {
        self.to_address.as_str()
    }

    pub fn get_amount(&self) -> Amount {
        self.amount
    }

    // Only contract hooks call this, before the transaction is sealed into a block
    pub fn set_amount(&mut self, amount: Amount) {
        self.amount = amount;
    }

    pub fn get_fee(&self) -> Amount {
        self.fee
    }

    pub fn get_signature(&self) -> &str {
        self.signature.as_str()
    }

    pub fn get_note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn get_block_id(&self) -> Option<u64> {
        self.block_id
    }

    pub fn set_block_id(&mut self, block_id: Option<u64>) {
        self.block_id = block_id;
    }

    pub fn is_pending(&self) -> bool {
        self.block_id.is_none()
    }
}
