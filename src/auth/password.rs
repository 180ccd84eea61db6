use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;

use crate::app::{EstuaryError, Result};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Fresh random salt, hex encoded for storage.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash `password` with argon2id under the stored `salt`. The result is a
/// PHC string.
pub fn hash_password(password: &str, salt: &str) -> Result<String> {
    let salt = phc_salt(salt)?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| EstuaryError::Other(format!("password hashing failed: {}", e)))
}

/// Constant-time check of `password` against a stored hash and salt.
pub fn verify_password(password: &str, hash: &str, salt: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    let Ok(expected_salt) = phc_salt(salt) else {
        return false;
    };
    if parsed.salt.map(|s| s.as_str()) != Some(expected_salt.as_str()) {
        return false;
    }

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn phc_salt(salt: &str) -> Result<SaltString> {
    let bytes = hex::decode(salt).map_err(|_| EstuaryError::Other("corrupt password salt".into()))?;
    if bytes.len() < SALT_LEN {
        return Err(EstuaryError::Other("password salt too short".into()));
    }
    SaltString::encode_b64(&bytes)
        .map_err(|e| EstuaryError::Other(format!("invalid password salt: {}", e)))
}
