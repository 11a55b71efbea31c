//! Assertion replay cache trait.
//!
//! Every bearer assertion may be presented once. The cache is keyed by the
//! assertion identifier (JWT `jti`, SAML `ID`) or, when the assertion has
//! none, by its signature value.
//!
//! # Security Considerations
//!
//! - Entries are kept until the assertion itself expires
//! - `mark_used` must be an atomic insert-if-absent

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// Storage trait for presented assertion identifiers.
#[async_trait]
pub trait ReplayCache: Send + Sync {
    /// Atomically records an assertion identifier if it is not already live.
    ///
    /// # Arguments
    ///
    /// * `key` - The assertion identifier
    /// * `expires_at` - When this entry may be forgotten
    ///
    /// # Returns
    ///
    /// Returns `true` on first presentation, `false` if the identifier was
    /// already recorded and has not expired (a replay).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    ///
    /// # Atomicity
    ///
    /// ```sql
    /// INSERT INTO used_assertions (key, expires_at)
    /// VALUES ($1, $2)
    /// ON CONFLICT (key) DO UPDATE SET expires_at = EXCLUDED.expires_at
    ///   WHERE used_assertions.expires_at <= NOW()
    /// RETURNING key
    /// ```
    async fn mark_used(&self, key: &str, expires_at: OffsetDateTime) -> AuthResult<bool>;

    /// Forgets expired entries, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
