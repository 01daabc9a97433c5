//! Wallets and key management
//!
//! A wallet is a registered public key plus a display name; its address is
//! derived from the key. Key pairs live in `WalletKeys` and, for the CLI, in a
//! local keystore file.

pub mod keystore;
#[allow(clippy::module_inception)]
pub mod wallet;

pub use keystore::{Keystore, KeystoreEntry, KEYSTORE_FILE};
pub use wallet::{derive_address, validate_address, Wallet, WalletKeys, ADDRESS_PREFIX};
