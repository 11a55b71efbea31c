//! Access and refresh token storage traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{AccessToken, RefreshToken};

/// Storage trait for issued access token records.
#[async_trait]
pub trait AccessTokenStorage: Send + Sync {
    /// Records an issued access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, token: &AccessToken) -> AuthResult<()>;

    /// Finds an access token record by id (`jti`).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<AccessToken>>;

    /// Deletes expired access token records, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}

/// Storage trait for refresh tokens.
///
/// Tokens are stored and looked up by SHA-256 hash
/// (see [`RefreshToken::hash_token`]).
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Persists a new refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Finds a refresh token by hash, consumed or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Atomically rotates a refresh token.
    ///
    /// Checks the token identified by `token_hash` with
    /// [`RefreshToken::rotate`], marks it consumed in favour of
    /// `replacement`, then persists `replacement`. The check and the
    /// consumed mark are one indivisible step; of any number of concurrent
    /// rotations of the same token at most one succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the token is unknown, consumed,
    /// expired, or owned by another client.
    ///
    /// # Atomicity
    ///
    /// A relational implementation runs, in one transaction:
    ///
    /// ```sql
    /// UPDATE refresh_tokens SET consumed_at = NOW(), replaced_by = $3
    /// WHERE token_hash = $1 AND client_id = $2 AND consumed_at IS NULL AND expires_at > NOW();
    /// INSERT INTO refresh_tokens ...;
    /// ```
    async fn rotate(
        &self,
        token_hash: &str,
        client_id: &str,
        replacement: &RefreshToken,
    ) -> AuthResult<RefreshToken>;

    /// Deletes expired refresh tokens, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
