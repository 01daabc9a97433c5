use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
    ECDSA_P256_SHA256_FIXED_SIGNING,
};

use crate::error::{BlockchainError, Result};
use data_encoding::{BASE64, HEXLOWER, HEXUPPER};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?
        .as_millis();

    if duration > i64::MAX as u128 {
        return Err(BlockchainError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// SHA-256 rendered as upper-case hex, the form used for block hashes and addresses
pub fn sha256_hex(data: &[u8]) -> String {
    HEXUPPER.encode(&sha256_digest(data))
}

/// Generate a fresh P-256 key pair as a PKCS#8 document
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to generate ECDSA key pair: {e}")))?
        .as_ref()
        .to_vec();
    Ok(pkcs8)
}

fn load_key_pair(pkcs8: &[u8]) -> Result<EcdsaKeyPair> {
    let rng = SystemRandom::new();
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}")))
}

/// Uncompressed public point of a PKCS#8 private key
pub fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    Ok(load_key_pair(pkcs8)?.public_key().as_ref().to_vec())
}

pub fn ecdsa_p256_sha256_sign(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = load_key_pair(pkcs8)?;
    let signature = key_pair
        .sign(&rng, message)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to sign message: {e}")))?
        .as_ref()
        .to_vec();
    Ok(signature)
}

pub fn ecdsa_p256_sha256_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key)
        .verify(message, signature)
        .is_ok()
}

/// Text form of a key pair: (hex PKCS#8 private key, hex public point)
pub fn generate_key_pair_hex() -> Result<(String, String)> {
    let pkcs8 = new_key_pair()?;
    let public_key = public_key_from_pkcs8(&pkcs8)?;
    Ok((HEXLOWER.encode(&pkcs8), HEXLOWER.encode(&public_key)))
}

pub fn public_key_from_private_hex(private_key: &str) -> Result<String> {
    let pkcs8 = decode_private_key(private_key)?;
    Ok(HEXLOWER.encode(&public_key_from_pkcs8(&pkcs8)?))
}

fn decode_private_key(private_key: &str) -> Result<Vec<u8>> {
    HEXLOWER
        .decode(private_key.trim().to_ascii_lowercase().as_bytes())
        .map_err(|e| BlockchainError::Crypto(format!("Private key is not valid hex: {e}")))
}

/// Sign a UTF-8 payload, returning the signature as base64
pub fn sign_payload(payload: &str, private_key: &str) -> Result<String> {
    let pkcs8 = decode_private_key(private_key)?;
    let signature = ecdsa_p256_sha256_sign(&pkcs8, payload.as_bytes())?;
    Ok(BASE64.encode(&signature))
}

/// Malformed keys or signatures count as a failed verification
pub fn verify_payload(payload: &str, signature: &str, public_key: &str) -> bool {
    let Ok(signature) = BASE64.decode(signature.as_bytes()) else {
        return false;
    };
    let Ok(public_key) = HEXLOWER.decode(public_key.trim().to_ascii_lowercase().as_bytes()) else {
        return false;
    };
    ecdsa_p256_sha256_verify(&public_key, &signature, payload.as_bytes())
}
