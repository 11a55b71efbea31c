//! Authorization code storage trait.
//!
//! # Security Considerations
//!
//! - Codes are single use; `consume` must be atomic
//! - Codes are short-lived and expiry is checked on every read
//! - A failed redemption must leave the stored code untouched

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::AuthorizationCode;

/// Storage trait for authorization codes.
#[async_trait]
pub trait CodeStorage: Send + Sync {
    /// Persists a newly minted, unconsumed code.
    ///
    /// # Errors
    ///
    /// Returns an error if a code with the same value exists or the
    /// storage operation fails.
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()>;

    /// Atomically redeems a code.
    ///
    /// Looks the code up, applies [`AuthorizationCode::redeem`], and marks
    /// it consumed, as one indivisible step. Of any number of concurrent
    /// calls for the same code at most one succeeds.
    ///
    /// # Arguments
    ///
    /// * `code` - The code value presented by the client
    /// * `client_id` - The authenticated client
    /// * `redirect_uri` - The `redirect_uri` sent with the token request
    /// * `audience` - The `audience` sent with the token request
    ///
    /// # Returns
    ///
    /// Returns the code as it was bound at issuance.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the code is unknown, consumed,
    /// expired, or bound to another client, redirect URI or audience. A
    /// failed check leaves the code redeemable.
    ///
    /// # Atomicity
    ///
    /// A relational implementation uses a conditional update:
    ///
    /// ```sql
    /// UPDATE authorization_codes
    /// SET consumed_at = NOW()
    /// WHERE code = $1 AND client_id = $2 AND consumed_at IS NULL AND expires_at > NOW()
    /// RETURNING *
    /// ```
    async fn consume(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: Option<&str>,
        audience: Option<&str>,
    ) -> AuthResult<AuthorizationCode>;

    /// Deletes expired codes, returning how many were removed.
    ///
    /// Needed only for storage reclamation; expiry is enforced on read.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
