//! JWT bearer assertion validation.
//!
//! Validates a compact JWS presented with
//! `grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer`.
//!
//! # Checks
//!
//! In order, each with its own error kind:
//!
//! 1. A signature is present (`SignatureRequired`)
//! 2. The signature verifies with the issuer's trusted key (`UntrustedSignature`)
//! 3. `iss` is present (`IssuerRequired`)
//! 4. `exp` is present (`ExpiryRequired`)
//! 5. `aud`, when present, names the token endpoint (`AudienceMismatch`)
//! 6. `iat`, `nbf` and `exp` admit the current time (`AssertionExpired`)
//!
//! Then `sub` must be present and the assertion must not have been presented
//! before.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Validation;
use serde::Deserialize;
use time::OffsetDateTime;

use super::{AssertionContext, AssertionValidator, ValidatedAssertion};
use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::TrustedKey;
use crate::token::jwt::SigningAlgorithm;
use crate::types::scope;

/// A claim that may be a single string or an array of strings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StringOrArray {
    Single(String),
    Multiple(Vec<String>),
}

impl StringOrArray {
    /// Returns `true` if `value` is the single value or one of the values.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(s) => s == value,
            Self::Multiple(values) => values.iter().any(|v| v == value),
        }
    }

    /// All values as a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multiple(values) => values.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JoseHeader {
    alg: String,
}

/// Claims read from a JWT bearer assertion.
#[derive(Debug, Clone, Deserialize)]
pub struct AssertionClaims {
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub aud: Option<StringOrArray>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub nbf: Option<i64>,
    pub jti: Option<String>,
    pub scope: Option<String>,
}

/// Validator for JWT bearer assertions.
pub struct JwtBearerValidator {
    context: AssertionContext,
}

impl JwtBearerValidator {
    /// Creates a validator over the shared assertion context.
    #[must_use]
    pub fn new(context: AssertionContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl AssertionValidator for JwtBearerValidator {
    async fn validate(&self, assertion: &str) -> AuthResult<ValidatedAssertion> {
        let segments: Vec<&str> = assertion.trim().split('.').collect();
        if !(2..=3).contains(&segments.len()) {
            return Err(AuthError::invalid_grant("Assertion is not a compact JWT"));
        }

        // 1. Signature presence
        let header: JoseHeader = decode_segment(segments[0])?;
        let signature = segments.get(2).copied().unwrap_or("");
        if header.alg.eq_ignore_ascii_case("none") || signature.is_empty() {
            return Err(AuthError::signature_required("JWT assertion is not signed"));
        }

        let algorithm: SigningAlgorithm = header.alg.parse().map_err(|_| {
            AuthError::untrusted_signature(format!(
                "Unsupported assertion signature algorithm '{}'",
                header.alg
            ))
        })?;

        // 2-3. Signature against the issuer's trusted key
        let claims: AssertionClaims = decode_segment(segments[1])?;
        let token = assertion.trim();
        let issuer = self
            .context
            .resolve_issuer(claims.iss.as_deref(), |key| {
                verify_signature(token, algorithm, key)
            })
            .await?;

        // 4. Expiry
        let exp = claims.exp.ok_or(AuthError::ExpiryRequired)?;
        let expires_at = OffsetDateTime::from_unix_timestamp(exp)
            .map_err(|_| AuthError::invalid_grant("Assertion exp is out of range"))?;

        // 5. Audience
        if let Some(aud) = &claims.aud
            && !aud.contains(&self.context.audience)
        {
            return Err(AuthError::audience_mismatch(format!(
                "Assertion is not addressed to {}",
                self.context.audience
            )));
        }

        // 6. Time window
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let skew = self.context.clock_skew.whole_seconds();
        if now > exp.saturating_add(skew) {
            return Err(AuthError::assertion_expired("Assertion has expired"));
        }
        if let Some(iat) = claims.iat
            && iat > now.saturating_add(skew)
        {
            return Err(AuthError::assertion_expired("Assertion is issued in the future"));
        }
        if let Some(nbf) = claims.nbf
            && nbf > now.saturating_add(skew)
        {
            return Err(AuthError::assertion_expired("Assertion is not yet valid"));
        }

        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::invalid_grant("Assertion has no subject"))?;

        let replay_id = claims.jti.as_deref().unwrap_or(signature);
        self.context
            .check_replay("jwt", &issuer, replay_id, expires_at)
            .await?;

        tracing::debug!(issuer = %issuer, subject = %subject, "JWT bearer assertion accepted");

        Ok(ValidatedAssertion {
            issuer,
            subject,
            audiences: claims.aud.map(|aud| aud.to_vec()).unwrap_or_default(),
            scopes: claims.scope.as_deref().map(scope::parse).unwrap_or_default(),
            expires_at,
        })
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> AuthResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| AuthError::invalid_grant("Assertion segment is not base64url"))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_grant(format!("Assertion segment is not valid JSON: {e}")))
}

/// Checks only the signature; claims are validated separately so each
/// failure gets its own error kind.
fn verify_signature(token: &str, algorithm: SigningAlgorithm, key: &TrustedKey) -> bool {
    let decoding_key = match key.decoding_key() {
        Ok(decoding_key) => decoding_key,
        Err(e) => {
            tracing::warn!(issuer = %key.issuer, error = %e, "Trusted key unusable");
            return false;
        }
    };

    let mut validation = Validation::new(algorithm.to_jwt_algorithm());
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    jsonwebtoken::decode::<serde_json::Value>(token, &decoding_key, &validation).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::storage::MemoryStore;
    use jsonwebtoken::{EncodingKey, Header};
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use serde_json::{Value, json};
    use std::sync::{Arc, OnceLock};

    const ENDPOINT: &str = "http://localhost:8080/oauth/token";

    struct Keys {
        trusted: EncodingKey,
        trusted_pem: String,
        untrusted: EncodingKey,
    }

    fn keys() -> &'static Keys {
        static KEYS: OnceLock<Keys> = OnceLock::new();
        KEYS.get_or_init(|| {
            let trusted = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
            let untrusted = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
            let encoding = |key: &RsaPrivateKey| {
                let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
                EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap()
            };
            Keys {
                trusted: encoding(&trusted),
                trusted_pem: trusted
                    .to_public_key()
                    .to_public_key_pem(LineEnding::LF)
                    .unwrap(),
                untrusted: encoding(&untrusted),
            }
        })
    }

    fn validator() -> JwtBearerValidator {
        let store = Arc::new(MemoryStore::new());
        store.insert_trusted_key(TrustedKey::from_pem("idp", &keys().trusted_pem).unwrap());
        JwtBearerValidator::new(AssertionContext::new(
            &AuthConfig::default(),
            store.clone(),
            store,
        ))
    }

    fn claims() -> Value {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        json!({
            "iss": "idp",
            "sub": "alice",
            "aud": ENDPOINT,
            "iat": now,
            "exp": now + 300,
            "jti": uuid::Uuid::new_v4().to_string(),
            "scope": "read_balance",
        })
    }

    fn sign(claims: &Value, key: &EncodingKey) -> String {
        jsonwebtoken::encode(&Header::new(jsonwebtoken::Algorithm::RS256), claims, key).unwrap()
    }

    fn without(claim: &str) -> Value {
        let mut claims = claims();
        claims.as_object_mut().unwrap().remove(claim);
        claims
    }

    #[tokio::test]
    async fn test_valid_assertion() {
        let token = sign(&claims(), &keys().trusted);
        let validated = validator().validate(&token).await.unwrap();

        assert_eq!(validated.issuer, "idp");
        assert_eq!(validated.subject, "alice");
        assert_eq!(validated.audiences, vec![ENDPOINT.to_string()]);
        assert_eq!(validated.scopes, vec!["read_balance".to_string()]);
    }

    #[tokio::test]
    async fn test_unsigned_assertion() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims().to_string());

        let err = validator()
            .validate(&format!("{header}.{payload}."))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SignatureRequired { .. }));

        let signed = sign(&claims(), &keys().trusted);
        let stripped = signed.rsplit_once('.').unwrap().0;
        let err = validator().validate(stripped).await.unwrap_err();
        assert!(matches!(err, AuthError::SignatureRequired { .. }));
    }

    #[tokio::test]
    async fn test_untrusted_key() {
        let token = sign(&claims(), &keys().untrusted);
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::UntrustedSignature { .. }));
    }

    #[tokio::test]
    async fn test_unknown_issuer() {
        let mut claims = claims();
        claims["iss"] = json!("stranger");
        let err = validator()
            .validate(&sign(&claims, &keys().trusted))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UntrustedSignature { .. }));
    }

    #[tokio::test]
    async fn test_hmac_rejected() {
        let token = jsonwebtoken::encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims(),
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::UntrustedSignature { .. }));
    }

    #[tokio::test]
    async fn test_missing_issuer() {
        let err = validator()
            .validate(&sign(&without("iss"), &keys().trusted))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IssuerRequired));

        let err = validator()
            .validate(&sign(&without("iss"), &keys().untrusted))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UntrustedSignature { .. }));
    }

    #[tokio::test]
    async fn test_missing_expiry() {
        let err = validator()
            .validate(&sign(&without("exp"), &keys().trusted))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ExpiryRequired));
    }

    #[tokio::test]
    async fn test_audience_mismatch() {
        let mut claims = claims();
        claims["aud"] = json!(["https://other.example.com/token"]);
        let err = validator()
            .validate(&sign(&claims, &keys().trusted))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AudienceMismatch { .. }));
    }

    #[tokio::test]
    async fn test_expired_and_future_assertions() {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut expired = claims();
        expired["exp"] = json!(now - 600);
        let err = validator()
            .validate(&sign(&expired, &keys().trusted))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AssertionExpired { .. }));

        let mut future = claims();
        future["nbf"] = json!(now + 600);
        let err = validator()
            .validate(&sign(&future, &keys().trusted))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AssertionExpired { .. }));
    }

    #[tokio::test]
    async fn test_clock_skew_tolerated() {
        let mut claims = claims();
        claims["exp"] = json!(OffsetDateTime::now_utc().unix_timestamp() - 30);
        assert!(validator().validate(&sign(&claims, &keys().trusted)).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_subject() {
        let err = validator()
            .validate(&sign(&without("sub"), &keys().trusted))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let validator = validator();
        let token = sign(&without("jti"), &keys().trusted);

        validator.validate(&token).await.unwrap();
        let err = validator.validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[test]
    fn test_string_or_array() {
        let single: StringOrArray = serde_json::from_value(json!("a")).unwrap();
        let multiple: StringOrArray = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert!(single.contains("a"));
        assert!(multiple.contains("b"));
        assert!(!multiple.contains("c"));
        assert_eq!(multiple.to_vec().len(), 2);
    }
}
