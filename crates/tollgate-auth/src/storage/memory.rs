//! In-memory implementation of every storage trait.
//!
//! Entries live in `DashMap`s. Check-and-consume operations run while the
//! entry's shard guard is held, which makes them indivisible with respect to
//! every other operation on the same key.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{
    AccessTokenStorage, ClientStorage, CodeStorage, RefreshTokenStorage, ReplayCache,
    TrustStore, TrustedKey, UserStorage,
};
use crate::types::{AccessToken, AuthorizationCode, Client, RefreshToken, User};

/// Process-local store for clients, trusted keys, users, codes, and tokens.
#[derive(Default)]
pub struct MemoryStore {
    clients: DashMap<String, Client>,
    trusted_keys: DashMap<String, TrustedKey>,
    users: DashMap<String, User>,
    codes: DashMap<String, AuthorizationCode>,
    access_tokens: DashMap<Uuid, AccessToken>,
    refresh_tokens: DashMap<String, RefreshToken>,
    replay: DashMap<String, OffsetDateTime>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a client.
    pub fn insert_client(&self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }

    /// Trusts a key for its issuer, replacing any previous key.
    pub fn insert_trusted_key(&self, key: TrustedKey) {
        self.trusted_keys.insert(key.issuer.clone(), key);
    }

    /// Registers or replaces a user.
    pub fn insert_user(&self, user: User) {
        self.users.insert(user.username.clone(), user);
    }
}

#[async_trait]
impl ClientStorage for MemoryStore {
    async fn lookup_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }
}

#[async_trait]
impl TrustStore for MemoryStore {
    async fn resolve_signing_key(&self, issuer: &str) -> AuthResult<Option<TrustedKey>> {
        Ok(self.trusted_keys.get(issuer).map(|k| k.value().clone()))
    }

    async fn trusted_keys(&self) -> AuthResult<Vec<TrustedKey>> {
        Ok(self
            .trusted_keys
            .iter()
            .map(|k| k.value().clone())
            .collect())
    }
}

#[async_trait]
impl UserStorage for MemoryStore {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(username).map(|u| u.value().clone()))
    }
}

#[async_trait]
impl CodeStorage for MemoryStore {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        match self.codes.entry(code.code.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage("Authorization code already exists")),
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(())
            }
        }
    }

    async fn consume(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: Option<&str>,
        audience: Option<&str>,
    ) -> AuthResult<AuthorizationCode> {
        let mut entry = self
            .codes
            .get_mut(code)
            .ok_or_else(|| AuthError::invalid_grant("Unknown authorization code"))?;

        entry
            .value_mut()
            .redeem(client_id, redirect_uri, audience, OffsetDateTime::now_utc())?;

        Ok(entry.value().clone())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired_at(now));
        Ok(before.saturating_sub(self.codes.len()) as u64)
    }
}

#[async_trait]
impl AccessTokenStorage for MemoryStore {
    async fn create(&self, token: &AccessToken) -> AuthResult<()> {
        self.access_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<AccessToken>> {
        Ok(self.access_tokens.get(&id).map(|t| t.value().clone()))
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.access_tokens.len();
        self.access_tokens.retain(|_, token| !token.is_expired_at(now));
        Ok(before.saturating_sub(self.access_tokens.len()) as u64)
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryStore {
    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        self.refresh_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self
            .refresh_tokens
            .get(token_hash)
            .map(|t| t.value().clone()))
    }

    async fn rotate(
        &self,
        token_hash: &str,
        client_id: &str,
        replacement: &RefreshToken,
    ) -> AuthResult<RefreshToken> {
        // The shard guard must be released before inserting the replacement,
        // which may hash to the same shard.
        let previous = {
            let mut entry = self
                .refresh_tokens
                .get_mut(token_hash)
                .ok_or_else(|| AuthError::invalid_grant("Unknown refresh token"))?;

            entry
                .value_mut()
                .rotate(client_id, replacement.id, OffsetDateTime::now_utc())?;
            entry.value().clone()
        };

        self.refresh_tokens
            .insert(replacement.token_hash.clone(), replacement.clone());

        Ok(previous)
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.refresh_tokens.len();
        self.refresh_tokens
            .retain(|_, token| !token.is_expired_at(now));
        Ok(before.saturating_sub(self.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl ReplayCache for MemoryStore {
    async fn mark_used(&self, key: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        match self.replay.entry(key.to_string()) {
            Entry::Occupied(mut seen) => {
                if *seen.get() > now {
                    return Ok(false);
                }
                seen.insert(expires_at);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.replay.len();
        self.replay.retain(|_, expires_at| *expires_at > now);
        Ok(before.saturating_sub(self.replay.len()) as u64)
    }
}
