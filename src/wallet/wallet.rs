use crate::error::Result;
use crate::utils::{
    current_timestamp, generate_key_pair_hex, public_key_from_private_hex, sha256_hex,
    sign_payload,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const ADDRESS_PREFIX: &str = "ADDR_";
pub const ADDRESS_HASH_LEN: usize = 20;

/// A registered participant; the address is a pure function of the public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    id: u64,
    address: String,
    public_key: String,
    display_name: String,
    joined_on: i64,
}

impl Wallet {
    pub fn new(public_key: &str, display_name: &str) -> Result<Wallet> {
        Ok(Wallet {
            id: 0,
            address: derive_address(public_key),
            public_key: public_key.to_string(),
            display_name: display_name.to_string(),
            joined_on: current_timestamp()?,
        })
    }

    pub fn get_id(&self) -> u64 {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn get_public_key(&self) -> &str {
        self.public_key.as_str()
    }

    pub fn get_display_name(&self) -> &str {
        self.display_name.as_str()
    }

    pub fn get_joined_on(&self) -> i64 {
        self.joined_on
    }
}

/// `ADDR_` followed by the first 20 upper-case hex characters of SHA-256(public key)
pub fn derive_address(public_key: &str) -> String {
    let digest = sha256_hex(public_key.as_bytes());
    format!("{ADDRESS_PREFIX}{}", &digest[..ADDRESS_HASH_LEN])
}

pub fn validate_address(address: &str) -> bool {
    match address.strip_prefix(ADDRESS_PREFIX) {
        Some(hash) => {
            hash.len() == ADDRESS_HASH_LEN
                && hash
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        }
        None => false,
    }
}

/// Hex PKCS#8 private key and hex public point; the private half is wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop, bincode::Encode, bincode::Decode)]
pub struct WalletKeys {
    private_key: String,
    public_key: String,
}

impl WalletKeys {
    pub fn generate() -> Result<WalletKeys> {
        let (private_key, public_key) = generate_key_pair_hex()?;
        Ok(WalletKeys {
            private_key,
            public_key,
        })
    }

    pub fn from_private_key(private_key: &str) -> Result<WalletKeys> {
        let public_key = public_key_from_private_hex(private_key)?;
        Ok(WalletKeys {
            private_key: private_key.trim().to_string(),
            public_key,
        })
    }

    pub fn private_key(&self) -> &str {
        self.private_key.as_str()
    }

    pub fn public_key(&self) -> &str {
        self.public_key.as_str()
    }

    pub fn address(&self) -> String {
        derive_address(&self.public_key)
    }

    pub fn sign(&self, payload: &str) -> Result<String> {
        sign_payload(payload, &self.private_key)
    }
}

impl fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKeys")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
