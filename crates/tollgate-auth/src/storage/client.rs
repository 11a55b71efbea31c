//! Client registry trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Read-only view of the OAuth client registry.
///
/// Grant processing never registers, updates, or deletes clients; that is
/// the concern of whatever provisions the registry.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Looks up a client by its identifier.
    ///
    /// # Returns
    ///
    /// Returns `None` if no client with this id is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be queried.
    async fn lookup_client(&self, client_id: &str) -> AuthResult<Option<Client>>;
}
