//! Authorization server error types.
//!
//! This module defines every error that can occur while issuing codes,
//! redeeming grants, and validating bearer assertions. Assertion-level
//! variants are internal: the grant dispatcher folds them into
//! [`AuthError::InvalidGrant`] before anything reaches the wire.

use std::fmt;

/// Errors that can occur during authorization and grant processing.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client is missing, unknown, inactive, or failed authentication.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The redirect URI does not match a registered URI.
    #[error("Invalid redirect URI: {message}")]
    InvalidRedirectUri {
        /// Description of why the redirect URI was rejected.
        message: String,
    },

    /// The requested scope is invalid or exceeds what is allowed.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// A required parameter is missing or malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The grant type is not supported by this server.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The client is not allowed to use the requested grant type.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of why the client may not use the grant.
        message: String,
    },

    /// The code, refresh token, credentials, or assertion are not acceptable.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The resource owner did not authenticate.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The assertion carries no signature.
    #[error("Signature required: {message}")]
    SignatureRequired {
        /// Description of the missing signature.
        message: String,
    },

    /// The assertion signature does not verify against a trusted key.
    #[error("Untrusted signature: {message}")]
    UntrustedSignature {
        /// Description of why the signature is untrusted.
        message: String,
    },

    /// The assertion does not name its issuer.
    #[error("Issuer required")]
    IssuerRequired,

    /// The assertion carries no expiry.
    #[error("Expiry required")]
    ExpiryRequired,

    /// The assertion is not addressed to this token endpoint.
    #[error("Audience mismatch: {message}")]
    AudienceMismatch {
        /// Description of the audience mismatch.
        message: String,
    },

    /// The assertion is outside its validity window.
    #[error("Assertion expired: {message}")]
    AssertionExpired {
        /// Description of the failed time check.
        message: String,
    },

    /// The assertion uses an unsupported SAML version.
    #[error("Unsupported assertion version: {version}")]
    UnsupportedAssertionVersion {
        /// The version found in the assertion.
        version: String,
    },

    /// The SAML subject confirmation method is not bearer.
    #[error("Unsupported confirmation method: {method}")]
    UnsupportedConfirmationMethod {
        /// The confirmation method found in the assertion.
        method: String,
    },

    /// A registry or store call did not complete in time.
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Description of the unavailable dependency.
        message: String,
    },

    /// An error occurred while storing or retrieving grant data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRedirectUri` error.
    #[must_use]
    pub fn invalid_redirect_uri(message: impl Into<String>) -> Self {
        Self::InvalidRedirectUri {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `SignatureRequired` error.
    #[must_use]
    pub fn signature_required(message: impl Into<String>) -> Self {
        Self::SignatureRequired {
            message: message.into(),
        }
    }

    /// Creates a new `UntrustedSignature` error.
    #[must_use]
    pub fn untrusted_signature(message: impl Into<String>) -> Self {
        Self::UntrustedSignature {
            message: message.into(),
        }
    }

    /// Creates a new `AudienceMismatch` error.
    #[must_use]
    pub fn audience_mismatch(message: impl Into<String>) -> Self {
        Self::AudienceMismatch {
            message: message.into(),
        }
    }

    /// Creates a new `AssertionExpired` error.
    #[must_use]
    pub fn assertion_expired(message: impl Into<String>) -> Self {
        Self::AssertionExpired {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedAssertionVersion` error.
    #[must_use]
    pub fn unsupported_assertion_version(version: impl Into<String>) -> Self {
        Self::UnsupportedAssertionVersion {
            version: version.into(),
        }
    }

    /// Creates a new `UnsupportedConfirmationMethod` error.
    #[must_use]
    pub fn unsupported_confirmation_method(method: impl Into<String>) -> Self {
        Self::UnsupportedConfirmationMethod {
            method: method.into(),
        }
    }

    /// Creates a new `ServiceUnavailable` error.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns a stable, snake_case name for this error kind.
    ///
    /// Used as the `kind` field in logs so that folded assertion failures
    /// remain diagnosable.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidRedirectUri { .. } => "invalid_redirect_uri",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::Unauthorized { .. } => "unauthorized",
            Self::SignatureRequired { .. } => "signature_required",
            Self::UntrustedSignature { .. } => "untrusted_signature",
            Self::IssuerRequired => "issuer_required",
            Self::ExpiryRequired => "expiry_required",
            Self::AudienceMismatch { .. } => "audience_mismatch",
            Self::AssertionExpired { .. } => "assertion_expired",
            Self::UnsupportedAssertionVersion { .. } => "unsupported_assertion_version",
            Self::UnsupportedConfirmationMethod { .. } => "unsupported_confirmation_method",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Storage { .. } => "storage",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    ///
    /// Assertion validation failures map to `invalid_grant`.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidRedirectUri { .. } | Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::Unauthorized { .. } => "access_denied",
            Self::ServiceUnavailable { .. } => "temporarily_unavailable",
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
            Self::InvalidGrant { .. }
            | Self::SignatureRequired { .. }
            | Self::UntrustedSignature { .. }
            | Self::IssuerRequired
            | Self::ExpiryRequired
            | Self::AudienceMismatch { .. }
            | Self::AssertionExpired { .. }
            | Self::UnsupportedAssertionVersion { .. }
            | Self::UnsupportedConfirmationMethod { .. } => "invalid_grant",
        }
    }

    /// Returns the HTTP status code used when this error reaches the wire.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.category() {
            ErrorCategory::Authentication => 401,
            ErrorCategory::Unavailable => 503,
            ErrorCategory::Server => 500,
            ErrorCategory::Client | ErrorCategory::Assertion => 400,
        }
    }

    /// Returns true if this error was raised by a bearer assertion validator.
    #[must_use]
    pub fn is_assertion_error(&self) -> bool {
        self.category() == ErrorCategory::Assertion
    }

    /// Returns true if this error was caused by the client or its request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Client | ErrorCategory::Assertion | ErrorCategory::Authentication
        )
    }

    /// Returns true if this error is a server-side failure.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Server | ErrorCategory::Unavailable
        )
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient { .. }
            | Self::InvalidRedirectUri { .. }
            | Self::InvalidScope { .. }
            | Self::InvalidRequest { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::UnauthorizedClient { .. }
            | Self::InvalidGrant { .. } => ErrorCategory::Client,

            Self::Unauthorized { .. } => ErrorCategory::Authentication,

            Self::SignatureRequired { .. }
            | Self::UntrustedSignature { .. }
            | Self::IssuerRequired
            | Self::ExpiryRequired
            | Self::AudienceMismatch { .. }
            | Self::AssertionExpired { .. }
            | Self::UnsupportedAssertionVersion { .. }
            | Self::UnsupportedConfirmationMethod { .. } => ErrorCategory::Assertion,

            Self::ServiceUnavailable { .. } => ErrorCategory::Unavailable,

            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                ErrorCategory::Server
            }
        }
    }
}

/// Categories of authorization errors for logging and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or unacceptable request from the client.
    Client,
    /// Resource owner authentication failure.
    Authentication,
    /// Bearer assertion validation failure.
    Assertion,
    /// A dependency timed out.
    Unavailable,
    /// Server-side failure.
    Server,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Authentication => write!(f, "authentication"),
            Self::Assertion => write!(f, "assertion"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Server => write!(f, "server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_errors_surface_as_invalid_grant() {
        let errors = [
            AuthError::signature_required("unsigned"),
            AuthError::untrusted_signature("unknown key"),
            AuthError::IssuerRequired,
            AuthError::ExpiryRequired,
            AuthError::audience_mismatch("wrong endpoint"),
            AuthError::assertion_expired("too old"),
            AuthError::unsupported_assertion_version("1.1"),
            AuthError::unsupported_confirmation_method("holder-of-key"),
        ];

        for error in errors {
            assert!(error.is_assertion_error(), "{error} should be an assertion error");
            assert_eq!(error.oauth_error_code(), "invalid_grant");
            assert_eq!(error.http_status(), 400);
        }
    }

    #[test]
    fn test_kind_is_specific() {
        assert_eq!(AuthError::IssuerRequired.kind(), "issuer_required");
        assert_eq!(
            AuthError::unsupported_confirmation_method("x").kind(),
            "unsupported_confirmation_method"
        );
        assert_eq!(AuthError::invalid_grant("x").kind(), "invalid_grant");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::invalid_client("x").http_status(), 400);
        assert_eq!(AuthError::invalid_redirect_uri("x").http_status(), 400);
        assert_eq!(AuthError::unauthorized("x").http_status(), 401);
        assert_eq!(AuthError::service_unavailable("x").http_status(), 503);
        assert_eq!(AuthError::storage("x").http_status(), 500);
    }

    #[test]
    fn test_oauth_error_codes() {
        assert_eq!(
            AuthError::invalid_redirect_uri("x").oauth_error_code(),
            "invalid_request"
        );
        assert_eq!(
            AuthError::unsupported_grant_type("foo").oauth_error_code(),
            "unsupported_grant_type"
        );
        assert_eq!(
            AuthError::service_unavailable("x").oauth_error_code(),
            "temporarily_unavailable"
        );
    }

    #[test]
    fn test_error_category_predicates() {
        assert!(AuthError::invalid_scope("x").is_client_error());
        assert!(!AuthError::invalid_scope("x").is_server_error());
        assert!(AuthError::internal("x").is_server_error());
        assert!(AuthError::service_unavailable("x").is_server_error());
        assert_eq!(ErrorCategory::Assertion.to_string(), "assertion");
    }
}
