//! Resource owner storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::User;

/// Read-only lookup of resource owners.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;
}
