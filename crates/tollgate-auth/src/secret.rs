//! Client secret and password hashing.
//!
//! Client secrets and resource-owner passwords are stored only as Argon2id
//! PHC strings. Verification never distinguishes between a malformed hash and
//! a wrong secret at the call site: both fail authentication.

use std::sync::OnceLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::AuthResult;
use crate::error::AuthError;

/// Hashes a secret or password for storage.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails.
pub fn hash_secret(secret: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal(format!("Failed to hash secret: {e}")))
}

/// Verifies a secret or password against a stored hash.
///
/// A stored value that is not a valid PHC string never verifies.
#[must_use]
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored secret hash is not a valid PHC string");
            false
        }
    }
}

/// Spends the same Argon2 work as [`verify_secret`] for an account that
/// does not exist. Never verifies.
#[must_use]
pub fn verify_unknown_account(secret: &str) -> bool {
    verify_secret(secret, unknown_account_hash())
}

/// Hash of a random value nobody holds, created on first use.
fn unknown_account_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| {
        let unguessable = SaltString::generate(&mut OsRng);
        hash_secret(unguessable.as_str()).unwrap_or_default()
    })
}
