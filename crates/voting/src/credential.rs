//! Salted credential hashing.
//!
//! Stored form: `sha256$<salt>$<digest>`, both parts standard base64, where
//! `digest = SHA-256(salt || secret)`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use shared::error::{ApiError, ErrorCode};
use subtle::ConstantTimeEq;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;
pub const MAX_CREDENTIAL_BYTES: usize = 1024;

/// Rejects credentials that cannot be meaningfully hashed.
pub fn validate_secret(secret: &str) -> Result<(), ApiError> {
    if secret.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "credential cannot be empty"));
    }
    if secret.len() > MAX_CREDENTIAL_BYTES {
        return Err(ApiError::new(ErrorCode::Validation, "credential is too long"));
    }
    Ok(())
}

pub fn hash_credential(secret: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    format!(
        "{SCHEME}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(digest(&salt, secret))
    )
}

/// Malformed stored hashes never verify.
pub fn verify_credential(stored: &str, secret: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(salt_b64), Some(digest_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (STANDARD.decode(salt_b64), STANDARD.decode(digest_b64)) else {
        return false;
    };
    let actual = digest(&salt, secret);
    if expected.len() != actual.len() {
        return false;
    }
    expected.ct_eq(&actual).into()
}

fn digest(salt: &[u8], secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
#[path = "tests/credential_tests.rs"]
mod tests;
