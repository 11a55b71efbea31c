//! Assertion trust store.
//!
//! The trust store maps assertion issuers to the RSA public keys their
//! assertions must be signed with. Both the SAML2 and the JWT bearer
//! validators resolve keys through it.

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;

use crate::AuthResult;
use crate::error::AuthError;

/// A public key trusted to sign assertions for one issuer.
#[derive(Debug, Clone)]
pub struct TrustedKey {
    /// Issuer identifier as it appears in the assertion (`iss` / `<Issuer>`).
    pub issuer: String,

    public_key: RsaPublicKey,

    public_key_pem: String,
}

impl TrustedKey {
    /// Parses an SPKI PEM public key trusted for `issuer`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the PEM is not an RSA public key.
    pub fn from_pem(issuer: impl Into<String>, public_key_pem: &str) -> AuthResult<Self> {
        let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
            .map_err(|e| AuthError::configuration(format!("Invalid trusted key PEM: {e}")))?;

        Ok(Self {
            issuer: issuer.into(),
            public_key,
            public_key_pem: public_key_pem.to_string(),
        })
    }

    /// The RSA public key, for XML signature verification.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// The key as a `jsonwebtoken` decoding key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the PEM cannot be converted.
    pub fn decoding_key(&self) -> AuthResult<DecodingKey> {
        DecodingKey::from_rsa_pem(self.public_key_pem.as_bytes())
            .map_err(|e| AuthError::configuration(format!("Invalid trusted key PEM: {e}")))
    }
}

/// Storage trait for trusted assertion signing keys.
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Resolves the key trusted for an issuer.
    ///
    /// # Returns
    ///
    /// Returns `None` if the issuer is not trusted.
    ///
    /// # Errors
    ///
    /// Returns an error if the trust store cannot be queried.
    async fn resolve_signing_key(&self, issuer: &str) -> AuthResult<Option<TrustedKey>>;

    /// Returns every trusted key.
    ///
    /// Used to tell an untrusted signature apart from a trusted one that
    /// merely omits its issuer.
    ///
    /// # Errors
    ///
    /// Returns an error if the trust store cannot be queried.
    async fn trusted_keys(&self) -> AuthResult<Vec<TrustedKey>>;
}
