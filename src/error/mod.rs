//! Error handling for the ledger
//!
//! Validation outcomes (bad hash, bad signature, missing proof-of-work) are plain
//! booleans and never show up here. This enum covers the conditions a caller has
//! to react to: rejected transactions, failed chain adoption, missing records and
//! infrastructure failures.

use crate::core::Amount;
use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Debug, Clone, PartialEq)]
pub enum BlockchainError {
    /// Storage backend errors
    Database(String),
    /// Key material that cannot be parsed or used
    Crypto(String),
    /// Malformed transaction (negative amount, unparsable value, ...)
    Transaction(String),
    /// Keystore errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Sender cannot cover amount plus fee
    InsufficientFunds { required: Amount, available: Amount },
    /// Transaction signature does not verify under the sender's key
    InvalidSignature(String),
    /// Lookup of a block, wallet, node or transaction that does not exist
    NotFound { kind: &'static str, key: String },
    /// External chain adoption aborted, local state untouched
    SyncFailure(String),
    /// Block construction errors
    InvalidBlock(String),
    /// Mining errors
    Mining(String),
}

impl BlockchainError {
    pub fn not_found(kind: &'static str, key: impl fmt::Display) -> Self {
        BlockchainError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::InvalidSignature(msg) => write!(f, "Invalid signature: {msg}"),
            BlockchainError::NotFound { kind, key } => write!(f, "{kind} not found: {key}"),
            BlockchainError::SyncFailure(msg) => write!(f, "Chain sync failed: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
