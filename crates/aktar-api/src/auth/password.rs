//! Password hashing (Argon2id, PHC strings).

use std::sync::OnceLock;

use aktar_common::AktarError;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand_core::OsRng;

/// Hash a password into a PHC string
pub fn hash_password(password: &str) -> Result<String, AktarError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AktarError::Internal(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Burn the same work as a real check when the nickname does not exist,
/// so response time does not reveal registered nicknames.
pub fn verify_against_dummy(password: &str) -> bool {
    static DUMMY: OnceLock<String> = OnceLock::new();

    let phc = DUMMY.get_or_init(|| hash_password("aktar-dummy-password").unwrap_or_default());
    verify_password(password, phc);
    false
}
