//! SAML 2.0 bearer assertion validation.
//!
//! Validates a base64url-encoded `<Assertion>` presented with
//! `grant_type=urn:ietf:params:oauth:grant-type:saml2-bearer`.
//!
//! # Checks
//!
//! In order, each with its own error kind:
//!
//! 1. `Version="2.0"`; SAML 1.x is refused (`UnsupportedAssertionVersion`)
//! 2. An enveloped signature is present (`SignatureRequired`)
//! 3. It verifies with the issuer's trusted key (`UntrustedSignature`,
//!    `IssuerRequired` when a trusted signature has no issuer)
//! 4. `AudienceRestriction` names the token endpoint (`AudienceMismatch`)
//! 5. A bearer `SubjectConfirmation` exists (`UnsupportedConfirmationMethod`)
//!
//! Then the `Conditions` and confirmation time windows, the confirmation
//! `Recipient`, the `NameID` subject and the replay cache.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::xml::{self, XmlElement};
use super::{AssertionContext, AssertionValidator, ValidatedAssertion, xmldsig};
use crate::AuthResult;
use crate::error::AuthError;
use crate::types::scope;

/// Subject confirmation method of bearer assertions.
pub const BEARER_CONFIRMATION: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

/// Namespace of SAML 1.x assertions.
pub const SAML1_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:1.0:assertion";

/// Validator for SAML 2.0 bearer assertions.
pub struct Saml2BearerValidator {
    context: AssertionContext,
}

impl Saml2BearerValidator {
    /// Creates a validator over the shared assertion context.
    #[must_use]
    pub fn new(context: AssertionContext) -> Self {
        Self { context }
    }

    fn check_window(
        &self,
        element: &XmlElement,
        now: OffsetDateTime,
    ) -> AuthResult<Option<OffsetDateTime>> {
        let skew = self.context.clock_skew;

        if let Some(not_before) = timestamp(element, "NotBefore")?
            && now + skew < not_before
        {
            return Err(AuthError::assertion_expired(format!(
                "{} is not yet valid",
                element.local_name()
            )));
        }

        let not_on_or_after = timestamp(element, "NotOnOrAfter")?;
        if let Some(limit) = not_on_or_after
            && now - skew >= limit
        {
            return Err(AuthError::assertion_expired(format!(
                "{} has expired",
                element.local_name()
            )));
        }

        Ok(not_on_or_after)
    }
}

#[async_trait]
impl AssertionValidator for Saml2BearerValidator {
    async fn validate(&self, assertion: &str) -> AuthResult<ValidatedAssertion> {
        let decoded = URL_SAFE_NO_PAD
            .decode(assertion.trim().trim_end_matches('='))
            .map_err(|_| AuthError::invalid_grant("SAML assertion is not base64url"))?;
        let document = String::from_utf8(decoded)
            .map_err(|_| AuthError::invalid_grant("SAML assertion is not UTF-8"))?;
        let root = xml::parse(&document)?;

        // 1. Version
        check_version(&root)?;

        // 2. Signature presence
        let signature = root
            .child("Signature")
            .ok_or_else(|| AuthError::signature_required("SAML assertion is not signed"))?;

        // 3. Signature against the issuer's trusted key
        let issuer = root
            .child("Issuer")
            .map(XmlElement::text)
            .filter(|issuer| !issuer.is_empty());
        let issuer = self
            .context
            .resolve_issuer(issuer.as_deref(), |key| {
                xmldsig::verify_enveloped(&root, signature, key.public_key())
            })
            .await?;

        // 4. Audience restriction
        let conditions = root.child("Conditions");
        let mut audiences = Vec::new();
        if let Some(conditions) = conditions {
            for restriction in conditions.children_named("AudienceRestriction") {
                let named: Vec<String> = restriction
                    .children_named("Audience")
                    .map(XmlElement::text)
                    .collect();
                if !named.iter().any(|a| *a == self.context.audience) {
                    return Err(AuthError::audience_mismatch(format!(
                        "Assertion is not addressed to {}",
                        self.context.audience
                    )));
                }
                audiences.extend(named);
            }
        }

        // 5. Bearer subject confirmation
        let subject = root.child("Subject");
        let confirmations: Vec<&XmlElement> = subject
            .map(|s| s.children_named("SubjectConfirmation").collect())
            .unwrap_or_default();
        let bearer = confirmations
            .iter()
            .find(|c| c.attr("Method") == Some(BEARER_CONFIRMATION))
            .ok_or_else(|| {
                let method = confirmations
                    .first()
                    .and_then(|c| c.attr("Method"))
                    .unwrap_or("none");
                AuthError::unsupported_confirmation_method(method)
            })?;

        // 6. Time windows and recipient
        let now = OffsetDateTime::now_utc();
        let mut expires_at = None;
        if let Some(conditions) = conditions {
            expires_at = self.check_window(conditions, now)?;
        }
        if let Some(data) = bearer.child("SubjectConfirmationData") {
            if let Some(limit) = self.check_window(data, now)? {
                expires_at = Some(expires_at.map_or(limit, |e: OffsetDateTime| e.min(limit)));
            }
            if let Some(recipient) = data.attr("Recipient")
                && recipient != self.context.audience
            {
                return Err(AuthError::audience_mismatch(format!(
                    "Assertion recipient {recipient} is not the token endpoint"
                )));
            }
        }
        let expires_at = expires_at.ok_or(AuthError::ExpiryRequired)?;

        // 7. Subject
        let subject = subject
            .and_then(|s| s.child("NameID"))
            .map(XmlElement::text)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::invalid_grant("Assertion has no NameID subject"))?;

        // 8. Replay
        let replay_id = match root.attr("ID") {
            Some(id) => id.to_string(),
            None => signature
                .child("SignatureValue")
                .map(XmlElement::text)
                .unwrap_or_default(),
        };
        self.context
            .check_replay("saml2", &issuer, &replay_id, expires_at)
            .await?;

        tracing::debug!(issuer = %issuer, subject = %subject, "SAML2 bearer assertion accepted");

        Ok(ValidatedAssertion {
            issuer,
            subject,
            audiences,
            scopes: scope_attribute(&root),
            expires_at,
        })
    }
}

fn check_version(root: &XmlElement) -> AuthResult<()> {
    if let Some(major) = root.attr("MajorVersion") {
        let minor = root.attr("MinorVersion").unwrap_or("0");
        return Err(AuthError::unsupported_assertion_version(format!(
            "{major}.{minor}"
        )));
    }

    if root.own_namespace().as_deref() == Some(SAML1_ASSERTION_NS) {
        return Err(AuthError::unsupported_assertion_version("1.x"));
    }

    if root.local_name() != "Assertion" {
        return Err(AuthError::invalid_grant("Document is not a SAML assertion"));
    }

    match root.attr("Version") {
        Some("2.0") => Ok(()),
        Some(version) => Err(AuthError::unsupported_assertion_version(version)),
        None => Err(AuthError::unsupported_assertion_version("unspecified")),
    }
}

fn timestamp(element: &XmlElement, attribute: &str) -> AuthResult<Option<OffsetDateTime>> {
    element
        .attr(attribute)
        .map(|value| {
            OffsetDateTime::parse(value, &Rfc3339).map_err(|_| {
                AuthError::invalid_grant(format!("{attribute} is not an RFC 3339 timestamp"))
            })
        })
        .transpose()
}

/// Values of `Attribute Name="scope"`, each split on spaces.
fn scope_attribute(root: &XmlElement) -> Vec<String> {
    let Some(statement) = root.child("AttributeStatement") else {
        return Vec::new();
    };

    let values: Vec<String> = statement
        .children_named("Attribute")
        .filter(|a| a.attr("Name") == Some("scope"))
        .flat_map(|a| a.children_named("AttributeValue").map(XmlElement::text))
        .collect();

    scope::parse(&values.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::storage::{MemoryStore, TrustedKey};
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};
    use std::sync::{Arc, OnceLock};
    use time::Duration;

    const ENDPOINT: &str = "http://localhost:8080/oauth/token";

    fn trusted() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
    }

    fn untrusted() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
    }

    fn validator() -> Saml2BearerValidator {
        let pem = trusted()
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert_trusted_key(TrustedKey::from_pem("idp", &pem).unwrap());
        Saml2BearerValidator::new(AssertionContext::new(
            &AuthConfig::default(),
            store.clone(),
            store,
        ))
    }

    struct Template<'a> {
        issuer: Option<&'a str>,
        audience: &'a str,
        method: &'a str,
        not_on_or_after: OffsetDateTime,
    }

    impl Default for Template<'_> {
        fn default() -> Self {
            Self {
                issuer: Some("idp"),
                audience: ENDPOINT,
                method: BEARER_CONFIRMATION,
                not_on_or_after: OffsetDateTime::now_utc() + Duration::minutes(5),
            }
        }
    }

    impl Template<'_> {
        fn render(&self) -> String {
            let expiry = self.not_on_or_after.format(&Rfc3339).unwrap();
            let issuer = self
                .issuer
                .map(|i| format!("<saml2:Issuer>{i}</saml2:Issuer>"))
                .unwrap_or_default();
            format!(
                r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_{id}" Version="2.0" IssueInstant="2024-01-01T00:00:00Z">
  {issuer}
  <saml2:Subject>
    <saml2:NameID>alice</saml2:NameID>
    <saml2:SubjectConfirmation Method="{method}">
      <saml2:SubjectConfirmationData Recipient="{ENDPOINT}" NotOnOrAfter="{expiry}"/>
    </saml2:SubjectConfirmation>
  </saml2:Subject>
  <saml2:Conditions NotOnOrAfter="{expiry}">
    <saml2:AudienceRestriction><saml2:Audience>{audience}</saml2:Audience></saml2:AudienceRestriction>
  </saml2:Conditions>
  <saml2:AttributeStatement>
    <saml2:Attribute Name="scope"><saml2:AttributeValue>read_balance</saml2:AttributeValue></saml2:Attribute>
  </saml2:AttributeStatement>
</saml2:Assertion>"#,
                id = uuid::Uuid::new_v4().simple(),
                method = self.method,
                audience = self.audience,
            )
        }
    }

    fn encode(xml: &str) -> String {
        URL_SAFE_NO_PAD.encode(xml)
    }

    fn signed(template: &Template<'_>, key: &RsaPrivateKey) -> String {
        encode(&xmldsig::sign_enveloped(&template.render(), key).unwrap())
    }

    #[tokio::test]
    async fn test_valid_assertion() {
        let validated = validator()
            .validate(&signed(&Template::default(), trusted()))
            .await
            .unwrap();

        assert_eq!(validated.issuer, "idp");
        assert_eq!(validated.subject, "alice");
        assert_eq!(validated.audiences, vec![ENDPOINT.to_string()]);
        assert_eq!(validated.scopes, vec!["read_balance".to_string()]);
    }

    #[tokio::test]
    async fn test_saml11_rejected() {
        let saml11 = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:1.0:assertion" MajorVersion="1" MinorVersion="1" AssertionID="_x" Issuer="idp"/>"#;
        let err = validator().validate(&encode(saml11)).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::UnsupportedAssertionVersion { ref version } if version == "1.1"
        ));
    }

    #[tokio::test]
    async fn test_unsigned_rejected() {
        let err = validator()
            .validate(&encode(&Template::default().render()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SignatureRequired { .. }));
    }

    #[tokio::test]
    async fn test_untrusted_signature() {
        let err = validator()
            .validate(&signed(&Template::default(), untrusted()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UntrustedSignature { .. }));
    }

    #[tokio::test]
    async fn test_missing_issuer() {
        let template = Template {
            issuer: None,
            ..Template::default()
        };

        let err = validator()
            .validate(&signed(&template, trusted()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IssuerRequired));

        let err = validator()
            .validate(&signed(&template, untrusted()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UntrustedSignature { .. }));
    }

    #[tokio::test]
    async fn test_tampered_assertion() {
        let xml = xmldsig::sign_enveloped(&Template::default().render(), trusted()).unwrap();
        let tampered = xml.replace(">alice<", ">mallory<");
        let err = validator().validate(&encode(&tampered)).await.unwrap_err();
        assert!(matches!(err, AuthError::UntrustedSignature { .. }));
    }

    #[tokio::test]
    async fn test_audience_mismatch() {
        let template = Template {
            audience: "https://other.example.com/token",
            ..Template::default()
        };
        let err = validator()
            .validate(&signed(&template, trusted()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AudienceMismatch { .. }));
    }

    #[tokio::test]
    async fn test_holder_of_key_rejected() {
        let template = Template {
            method: "urn:oasis:names:tc:SAML:2.0:cm:holder-of-key",
            ..Template::default()
        };
        let err = validator()
            .validate(&signed(&template, trusted()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::UnsupportedConfirmationMethod { ref method }
                if method.ends_with("holder-of-key")
        ));
    }

    #[tokio::test]
    async fn test_expired_assertion() {
        let template = Template {
            not_on_or_after: OffsetDateTime::now_utc() - Duration::minutes(10),
            ..Template::default()
        };
        let err = validator()
            .validate(&signed(&template, trusted()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AssertionExpired { .. }));
    }

    #[tokio::test]
    async fn test_padded_encoding_accepted() {
        let xml = xmldsig::sign_enveloped(&Template::default().render(), trusted()).unwrap();
        let padded = base64::engine::general_purpose::URL_SAFE.encode(xml);
        assert!(validator().validate(&padded).await.is_ok());
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let validator = validator();
        let assertion = signed(&Template::default(), trusted());

        validator.validate(&assertion).await.unwrap();
        let err = validator.validate(&assertion).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_externally_signed_assertion() {
        let store = Arc::new(MemoryStore::new());
        store.insert_trusted_key(
            TrustedKey::from_pem(
                "https://idp.example.org/saml",
                include_str!("../../tests/fixtures/idp_public.pem"),
            )
            .unwrap(),
        );
        let validator = Saml2BearerValidator::new(AssertionContext::new(
            &AuthConfig::default(),
            store.clone(),
            store,
        ));

        let assertion = encode(include_str!("../../tests/fixtures/idp_signed_assertion.xml"));
        let validated = validator.validate(&assertion).await.unwrap();

        assert_eq!(validated.issuer, "https://idp.example.org/saml");
        assert_eq!(validated.subject, "alice");
        assert_eq!(validated.scopes, vec!["read_balance".to_string()]);
    }

    #[test]
    fn test_version_checks() {
        let v2 = xml::parse(r#"<Assertion Version="2.0"/>"#).unwrap();
        assert!(check_version(&v2).is_ok());

        let v3 = xml::parse(r#"<Assertion Version="3.0"/>"#).unwrap();
        assert!(matches!(
            check_version(&v3),
            Err(AuthError::UnsupportedAssertionVersion { .. })
        ));

        let other = xml::parse(r#"<Response Version="2.0"/>"#).unwrap();
        assert!(matches!(
            check_version(&other),
            Err(AuthError::InvalidGrant { .. })
        ));
    }
}
