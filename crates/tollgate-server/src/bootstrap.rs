//! Startup seeding of the in-memory stores.
//!
//! Clients, resource owners, and trusted assertion issuers come from
//! configuration. Plaintext secrets are hashed here and never stored.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tollgate_auth::secret::hash_secret;
use tollgate_auth::AuthResult;
use tollgate_auth::storage::{
    AccessTokenStorage, CodeStorage, MemoryStore, RefreshTokenStorage, ReplayCache,
};
use tollgate_auth::token::{JwtService, SigningAlgorithm, SigningKeyPair};
use tollgate_auth::types::{Client, User};
use tollgate_auth::{AuthConfig, TrustedKey};
use tracing::{info, warn};

use crate::config::{AppConfig, ClientSeed, TrustedIssuerSeed, UserSeed};

/// Builds a memory store holding every configured client, user, and issuer.
pub fn seed_store(cfg: &AppConfig) -> anyhow::Result<Arc<MemoryStore>> {
    let store = Arc::new(MemoryStore::new());

    for seed in &cfg.clients {
        store.insert_client(client_from_seed(seed)?);
    }
    for seed in &cfg.users {
        store.insert_user(user_from_seed(seed)?);
    }
    for seed in &cfg.trusted_issuers {
        store.insert_trusted_key(trusted_key_from_seed(seed)?);
    }

    info!(
        clients = cfg.clients.len(),
        users = cfg.users.len(),
        trusted_issuers = cfg.trusted_issuers.len(),
        "Stores seeded"
    );

    Ok(store)
}

fn client_from_seed(seed: &ClientSeed) -> anyhow::Result<Client> {
    let name = seed.name.clone().unwrap_or_else(|| seed.client_id.clone());
    let mut client = Client::new(&seed.client_id, name)
        .with_scopes(seed.scopes.iter().cloned())
        .with_audiences(seed.audiences.iter().cloned());
    client.redirect_uris = seed.redirect_uris.clone();

    if let Some(ref grant_types) = seed.grant_types {
        client = client.with_grant_types(grant_types.clone());
    }

    let hash = match (&seed.secret, &seed.secret_hash) {
        (Some(secret), _) => Some(
            hash_secret(secret)
                .with_context(|| format!("hashing secret of client '{}'", seed.client_id))?,
        ),
        (None, Some(hash)) => Some(hash.clone()),
        (None, None) => None,
    };
    if let Some(hash) = hash {
        client = client.with_secret_hash(hash);
    }

    Ok(client)
}

fn user_from_seed(seed: &UserSeed) -> anyhow::Result<User> {
    let hash = match (&seed.password, &seed.password_hash) {
        (Some(password), _) => hash_secret(password)
            .with_context(|| format!("hashing password of user '{}'", seed.username))?,
        (None, Some(hash)) => hash.clone(),
        (None, None) => anyhow::bail!("user '{}' has no password", seed.username),
    };
    Ok(User::new(&seed.username, hash))
}

fn trusted_key_from_seed(seed: &TrustedIssuerSeed) -> anyhow::Result<TrustedKey> {
    let pem = match (&seed.public_key_pem, &seed.public_key_path) {
        (Some(pem), _) => pem.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading key of issuer '{}' from {path}", seed.issuer))?,
        (None, None) => anyhow::bail!("trusted issuer '{}' has no key", seed.issuer),
    };
    TrustedKey::from_pem(&seed.issuer, &pem)
        .with_context(|| format!("loading key of issuer '{}'", seed.issuer))
}

/// Builds the access token signer from configuration.
///
/// Without a configured key a fresh one is generated, so tokens do not
/// survive a restart.
pub fn jwt_service(auth: &AuthConfig) -> anyhow::Result<Arc<JwtService>> {
    let algorithm: SigningAlgorithm = auth
        .signing
        .algorithm
        .parse()
        .context("parsing auth.signing.algorithm")?;

    let key = match auth.signing.private_key_pem {
        Some(ref pem) => SigningKeyPair::from_pem("configured", algorithm, pem)
            .context("loading auth.signing.private_key_pem")?,
        None => {
            warn!("No signing key configured; generating an ephemeral key");
            SigningKeyPair::generate_rsa(algorithm).context("generating signing key")?
        }
    };

    info!(kid = %key.kid, algorithm = %algorithm, "Access token signing key ready");
    Ok(Arc::new(JwtService::new(key, &auth.issuer)))
}

/// Periodically removes expired codes, access and refresh tokens, and
/// replay entries.
pub fn spawn_cleanup(store: Arc<MemoryStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep(&store).await {
                Ok(removed) if removed.total() > 0 => {
                    info!(
                        codes = removed.codes,
                        access_tokens = removed.access_tokens,
                        refresh_tokens = removed.refresh_tokens,
                        replay = removed.replay,
                        "Expired entries removed"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Cleanup failed"),
            }
        }
    })
}

/// Entries removed by one sweep.
#[derive(Debug, Default, PartialEq, Eq)]
struct Removed {
    codes: u64,
    access_tokens: u64,
    refresh_tokens: u64,
    replay: u64,
}

impl Removed {
    fn total(&self) -> u64 {
        self.codes + self.access_tokens + self.refresh_tokens + self.replay
    }
}

async fn sweep(store: &MemoryStore) -> AuthResult<Removed> {
    Ok(Removed {
        codes: CodeStorage::cleanup_expired(store).await?,
        access_tokens: AccessTokenStorage::cleanup_expired(store).await?,
        refresh_tokens: RefreshTokenStorage::cleanup_expired(store).await?,
        replay: ReplayCache::cleanup_expired(store).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Duration as TimeDuration, OffsetDateTime};
    use tollgate_auth::AccessToken;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_removes_expired_access_tokens() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let expired = AccessToken {
            id: Uuid::new_v4(),
            client_id: "consumer-id".to_string(),
            subject: "alice".to_string(),
            scopes: Vec::new(),
            audience: Vec::new(),
            issued_at: now - TimeDuration::hours(2),
            expires_at: now - TimeDuration::hours(1),
            refresh_token_id: None,
        };
        AccessTokenStorage::create(&store, &expired).await.unwrap();
        store
            .mark_used("seen", now - TimeDuration::seconds(1))
            .await
            .unwrap();

        let removed = sweep(&store).await.unwrap();
        assert_eq!(
            removed,
            Removed {
                access_tokens: 1,
                replay: 1,
                ..Removed::default()
            }
        );
        assert!(store.find_by_id(expired.id).await.unwrap().is_none());
        assert_eq!(sweep(&store).await.unwrap().total(), 0);
    }
}
