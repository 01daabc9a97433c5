use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::WalletKeys;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const KEYSTORE_FILE: &str = "wallet.dat";

#[derive(Clone, bincode::Encode, bincode::Decode)]
pub struct KeystoreEntry {
    pub label: String,
    pub keys: WalletKeys,
}

/// Local key pairs for the CLI, keyed by address
pub struct Keystore {
    path: PathBuf,
    entries: BTreeMap<String, KeystoreEntry>,
}

impl Keystore {
    /// Open the keystore at `path`, starting empty if the file does not exist yet
    pub fn open(path: &Path) -> Keystore {
        let mut keystore = Keystore {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
        };
        if let Err(e) = keystore.load_from_file() {
            log::warn!("Could not load keystore {}: {e}", path.display());
        }
        keystore
    }

    pub fn insert(&mut self, label: &str, keys: WalletKeys) -> Result<String> {
        let address = keys.address();
        self.entries.insert(
            address.clone(),
            KeystoreEntry {
                label: label.to_string(),
                keys,
            },
        );
        self.save_to_file()?;
        Ok(address)
    }

    /// Return the keys stored under `label`, generating and saving them on first use
    pub fn get_or_create(&mut self, label: &str) -> Result<WalletKeys> {
        if let Some(entry) = self.entries.values().find(|e| e.label == label) {
            return Ok(entry.keys.clone());
        }
        let keys = WalletKeys::generate()?;
        self.insert(label, keys.clone())?;
        Ok(keys)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, address: &str) -> Option<&KeystoreEntry> {
        self.entries.get(address)
    }

    pub fn require(&self, address: &str) -> Result<&KeystoreEntry> {
        self.get(address).ok_or_else(|| {
            BlockchainError::Wallet(format!("No local keys for address {address}"))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut file = File::open(&self.path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.entries = deserialize(&buf)?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&serialize(&self.entries)?)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keystore_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(KEYSTORE_FILE);

        let mut keystore = Keystore::open(&path);
        assert!(keystore.is_empty());
        let address = keystore.insert("alice", WalletKeys::generate().unwrap()).unwrap();

        let reopened = Keystore::open(&path);
        assert_eq!(reopened.get_addresses(), vec![address.clone()]);
        let entry = reopened.require(&address).unwrap();
        assert_eq!(entry.label, "alice");
        assert_eq!(entry.keys.address(), address);
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes").join("keys.dat");
        let mut keystore = Keystore::open(&path);
        let first = keystore.get_or_create("node:A").unwrap();
        let second = keystore.get_or_create("node:A").unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(keystore.len(), 1);

        let mut reopened = Keystore::open(&path);
        let third = reopened.get_or_create("node:A").unwrap();
        assert_eq!(first.public_key(), third.public_key());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(KEYSTORE_FILE);
        fs::write(&path, [0xFF, 0xFF, 0xFF]).unwrap();
        let keystore = Keystore::open(&path);
        assert!(keystore.is_empty());
        assert!(keystore.require("ADDR_X").is_err());
    }
}
