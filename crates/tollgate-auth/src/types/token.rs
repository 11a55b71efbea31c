//! Access and refresh token records.
//!
//! # Security
//!
//! - Refresh tokens are stored as SHA-256 hashes, never plaintext
//! - A refresh token is single use: rotation marks it consumed and records
//!   the id of its replacement

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;

/// Record of an issued access token.
///
/// Never mutated after issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Token id, equal to the `jti` claim of the issued JWT.
    pub id: Uuid,

    pub client_id: String,

    pub subject: String,

    pub scopes: Vec<String>,

    pub audience: Vec<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Refresh token issued alongside this access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_id: Option<Uuid>,
}

impl AccessToken {
    /// Returns `true` if the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Record of an issued refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,

    /// SHA-256 hex digest of the token value.
    pub token_hash: String,

    pub client_id: String,

    pub subject: String,

    /// Scopes of the original grant; a refresh may narrow but never widen them.
    pub scopes: Vec<String>,

    pub audience: Vec<String>,

    /// Access token issued alongside this refresh token.
    pub access_token_id: Uuid,

    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub consumed_at: Option<OffsetDateTime>,

    /// Id of the refresh token that replaced this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<Uuid>,
}

impl RefreshToken {
    /// Returns `true` if the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the token has been rotated away.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Checks that `client_id` may use this token at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the token is consumed, expired,
    /// or owned by another client.
    pub fn check_usable(&self, client_id: &str, now: OffsetDateTime) -> AuthResult<()> {
        if self.is_consumed() {
            return Err(AuthError::invalid_grant(
                "Refresh token has already been used",
            ));
        }

        if self.is_expired_at(now) {
            return Err(AuthError::invalid_grant("Refresh token has expired"));
        }

        if self.client_id != client_id {
            return Err(AuthError::invalid_grant(
                "Refresh token was issued to another client",
            ));
        }

        Ok(())
    }

    /// Checks usability and marks the token consumed in favour of `replacement`.
    ///
    /// # Errors
    ///
    /// Same as [`RefreshToken::check_usable`]; nothing is modified on error.
    pub fn rotate(
        &mut self,
        client_id: &str,
        replacement: Uuid,
        now: OffsetDateTime,
    ) -> AuthResult<()> {
        self.check_usable(client_id, now)?;
        self.consumed_at = Some(now);
        self.replaced_by = Some(replacement);
        Ok(())
    }

    /// Hashes a token value for storage and lookup.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generates a new refresh token value.
    #[must_use]
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
