//! Storage traits for grant-processing data.
//!
//! This module defines storage interfaces for:
//!
//! - The OAuth client registry
//! - Trusted assertion signing keys
//! - Authorization codes, access tokens, and refresh tokens
//! - The assertion replay cache
//! - Resource owners
//!
//! # Implementations
//!
//! [`MemoryStore`] implements every trait with atomic check-and-consume
//! semantics. Every call made by the services goes through [`bounded`], so a
//! slow backend surfaces as `ServiceUnavailable` instead of hanging a request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub mod client;
pub mod code;
pub mod memory;
pub mod replay;
pub mod token;
pub mod trust;
pub mod user;

pub use client::ClientStorage;
pub use code::CodeStorage;
pub use memory::MemoryStore;
pub use replay::ReplayCache;
pub use token::{AccessTokenStorage, RefreshTokenStorage};
pub use trust::{TrustStore, TrustedKey};
pub use user::UserStorage;

use crate::AuthResult;
use crate::error::AuthError;

/// Every store the grant-processing services depend on.
#[derive(Clone)]
pub struct Stores {
    pub clients: Arc<dyn ClientStorage>,
    pub trust: Arc<dyn TrustStore>,
    pub codes: Arc<dyn CodeStorage>,
    pub access_tokens: Arc<dyn AccessTokenStorage>,
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
    pub replay: Arc<dyn ReplayCache>,
    pub users: Arc<dyn UserStorage>,
}

impl Stores {
    /// Backs every store with one shared [`MemoryStore`].
    #[must_use]
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            clients: store.clone(),
            trust: store.clone(),
            codes: store.clone(),
            access_tokens: store.clone(),
            refresh_tokens: store.clone(),
            replay: store.clone(),
            users: store,
        }
    }
}

/// Runs a store call, failing with `ServiceUnavailable` if it exceeds `limit`.
///
/// The call is not retried.
///
/// # Errors
///
/// Returns the call's own error, or `AuthError::ServiceUnavailable` on timeout.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Store call timed out"
            );
            Err(AuthError::service_unavailable(format!(
                "{operation} did not complete in time"
            )))
        }
    }
}
