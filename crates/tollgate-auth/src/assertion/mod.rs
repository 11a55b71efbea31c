//! Bearer assertion validation.
//!
//! A client may present an assertion signed by a trusted third party in
//! place of user credentials. This module validates:
//!
//! - SAML 2.0 assertions (`urn:ietf:params:oauth:grant-type:saml2-bearer`)
//! - JWT assertions (`urn:ietf:params:oauth:grant-type:jwt-bearer`)
//!
//! Both validators share the issuer trust rules and the replay cache held
//! by [`AssertionContext`]. Validation failures carry specific error kinds
//! (`SignatureRequired`, `AudienceMismatch`, ...); the token endpoint folds
//! them into `invalid_grant` on the wire.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::config::{AuthConfig, to_time_duration};
use crate::error::AuthError;
use crate::storage::{ReplayCache, TrustStore, TrustedKey, bounded};

pub mod jwt_bearer;
pub mod saml2_bearer;
pub mod xml;
pub mod xmldsig;

pub use jwt_bearer::JwtBearerValidator;
pub use saml2_bearer::Saml2BearerValidator;

/// The outcome of a successful assertion validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAssertion {
    /// Trusted issuer that signed the assertion.
    pub issuer: String,

    /// Subject the assertion speaks for.
    pub subject: String,

    /// Audiences named by the assertion.
    pub audiences: Vec<String>,

    /// Scopes carried by the assertion, if any.
    pub scopes: Vec<String>,

    /// When the assertion stops being valid.
    pub expires_at: OffsetDateTime,
}

/// Validates one kind of bearer assertion.
#[async_trait]
pub trait AssertionValidator: Send + Sync {
    /// Validates an encoded assertion as presented in the `assertion`
    /// parameter of a token request.
    ///
    /// # Errors
    ///
    /// Returns an assertion error kind naming the first failed check,
    /// `InvalidGrant` for malformed input or a replay, or
    /// `ServiceUnavailable` if the trust store or replay cache times out.
    async fn validate(&self, assertion: &str) -> AuthResult<ValidatedAssertion>;
}

/// Collaborators and settings shared by the assertion validators.
#[derive(Clone)]
pub struct AssertionContext {
    trust: Arc<dyn TrustStore>,
    replay: Arc<dyn ReplayCache>,

    /// The token endpoint URL; every assertion must be addressed to it.
    pub audience: String,

    /// Tolerated clock difference for time window checks.
    pub clock_skew: Duration,

    replay_protection: bool,
    operation_timeout: StdDuration,
}

impl AssertionContext {
    /// Creates a context from the auth configuration.
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        trust: Arc<dyn TrustStore>,
        replay: Arc<dyn ReplayCache>,
    ) -> Self {
        Self {
            trust,
            replay,
            audience: config.token_endpoint.clone(),
            clock_skew: to_time_duration(config.assertion.clock_skew),
            replay_protection: config.assertion.replay_protection,
            operation_timeout: config.storage.operation_timeout,
        }
    }

    /// Establishes the trusted issuer of a signed assertion.
    ///
    /// With a claimed issuer, its trusted key must verify the signature.
    /// Without one, every trusted key is tried so that an assertion signed
    /// by a trusted party but missing its issuer (`IssuerRequired`) is told
    /// apart from one nobody trusts (`UntrustedSignature`).
    ///
    /// # Errors
    ///
    /// Returns `UntrustedSignature`, `IssuerRequired`, or
    /// `ServiceUnavailable` on a trust store timeout.
    pub async fn resolve_issuer<F>(&self, issuer: Option<&str>, verify: F) -> AuthResult<String>
    where
        F: Fn(&TrustedKey) -> bool,
    {
        match issuer {
            Some(issuer) => {
                let key = bounded(
                    self.operation_timeout,
                    "trust store lookup",
                    self.trust.resolve_signing_key(issuer),
                )
                .await?
                .ok_or_else(|| {
                    AuthError::untrusted_signature(format!("Issuer '{issuer}' is not trusted"))
                })?;

                if !verify(&key) {
                    return Err(AuthError::untrusted_signature(format!(
                        "Signature does not verify with the key trusted for '{issuer}'"
                    )));
                }

                Ok(issuer.to_string())
            }
            None => {
                let keys = bounded(
                    self.operation_timeout,
                    "trust store scan",
                    self.trust.trusted_keys(),
                )
                .await?;

                if keys.iter().any(|key| verify(key)) {
                    Err(AuthError::IssuerRequired)
                } else {
                    Err(AuthError::untrusted_signature(
                        "Signature does not verify with any trusted key",
                    ))
                }
            }
        }
    }

    /// Records an assertion identifier, rejecting a second presentation.
    ///
    /// Identifiers are only unique per issuer and assertion format, so the
    /// cache key is `kind:issuer:id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` on replay, or `ServiceUnavailable` on timeout.
    pub async fn check_replay(
        &self,
        kind: &str,
        issuer: &str,
        id: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<()> {
        if !self.replay_protection {
            return Ok(());
        }

        let key = format!("{kind}:{issuer}:{id}");

        let first_use = bounded(
            self.operation_timeout,
            "replay cache insert",
            self.replay.mark_used(&key, expires_at + self.clock_skew),
        )
        .await?;

        if first_use {
            Ok(())
        } else {
            Err(AuthError::invalid_grant("Assertion has already been used"))
        }
    }
}
