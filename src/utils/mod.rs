//! Utility functions and helpers
//!
//! Hashing, key handling, signing, and the encoders used by storage.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp, generate_key_pair_hex, public_key_from_private_hex, sha256_digest,
    sha256_hex, sign_payload, verify_payload,
};

pub use serialization::{deserialize, from_json, id_from_key, id_key, serialize, to_json_pretty};
