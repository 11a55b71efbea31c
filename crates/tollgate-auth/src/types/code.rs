//! Authorization code type.
//!
//! A code is minted by the authorization endpoint and redeemed exactly once
//! at the token endpoint. [`AuthorizationCode::redeem`] holds the redemption
//! rules so every store implementation applies them identically inside its
//! atomic section.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;

/// An issued authorization code and everything it is bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The opaque code value handed to the client.
    pub code: String,

    /// Client the code was issued to.
    pub client_id: String,

    /// Redirect URI the code was delivered to.
    pub redirect_uri: String,

    /// Whether the authorization request named the redirect URI explicitly.
    /// When it did, the token request must repeat it.
    pub redirect_uri_requested: bool,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Authenticated resource owner.
    pub subject: String,

    /// Audience the resulting tokens are for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When the code was redeemed. Set once, never cleared.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub consumed_at: Option<OffsetDateTime>,
}

impl AuthorizationCode {
    /// Generates a new authorization code value.
    ///
    /// 256 bits of randomness, base64url without padding (43 characters).
    #[must_use]
    pub fn generate_code() -> String {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Returns `true` if the code has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the code has already been redeemed.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Checks every redemption rule and marks the code consumed.
    ///
    /// Nothing is modified when a rule fails, so a client presenting a code
    /// that was not issued to it cannot burn the legitimate client's code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the code is consumed, expired,
    /// or bound to a different client, redirect URI or audience.
    pub fn redeem(
        &mut self,
        client_id: &str,
        redirect_uri: Option<&str>,
        audience: Option<&str>,
        now: OffsetDateTime,
    ) -> AuthResult<()> {
        if self.is_consumed() {
            return Err(AuthError::invalid_grant(
                "Authorization code has already been used",
            ));
        }

        if self.is_expired_at(now) {
            return Err(AuthError::invalid_grant("Authorization code has expired"));
        }

        if self.client_id != client_id {
            return Err(AuthError::invalid_grant(
                "Authorization code was issued to another client",
            ));
        }

        match redirect_uri {
            Some(uri) if uri != self.redirect_uri => {
                return Err(AuthError::invalid_grant("redirect_uri mismatch"));
            }
            None if self.redirect_uri_requested => {
                return Err(AuthError::invalid_grant("redirect_uri is required"));
            }
            _ => {}
        }

        if let Some(audience) = audience
            && self.audience.as_deref() != Some(audience)
        {
            return Err(AuthError::invalid_grant(
                "Audience does not match the authorization code",
            ));
        }

        self.consumed_at = Some(now);
        Ok(())
    }
}
