//! Token endpoint types.
//!
//! This module provides the wire types of the OAuth 2.0 token endpoint:
//! the form-encoded request, the JSON success response, and the JSON error
//! response.
//!
//! # Supported Grant Types
//!
//! - `authorization_code` - Exchange an authorization code for tokens
//! - `refresh_token` - Rotate a refresh token
//! - `password` - Resource owner password credentials
//! - `urn:ietf:params:oauth:grant-type:saml2-bearer` - SAML 2.0 assertion
//! - `urn:ietf:params:oauth:grant-type:jwt-bearer` - JWT assertion

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;

/// Token request parameters.
///
/// Every field is optional on the wire; which ones are required depends on
/// the `grant_type`:
///
/// - `authorization_code`: code, (optional) redirect_uri, (optional) audience
/// - `refresh_token`: refresh_token, (optional) scope
/// - `password`: username, password, (optional) scope
/// - `saml2-bearer` / `jwt-bearer`: assertion, (optional) scope
///
/// # Client Authentication
///
/// Clients authenticate using one of:
/// - HTTP Basic Auth header (not in this struct)
/// - `client_id` + `client_secret` in body
/// - `client_id` only (public clients)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// OAuth 2.0 grant type.
    #[serde(default)]
    pub grant_type: Option<String>,

    /// Authorization code (for authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI (must match the authorization request when it named one).
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Audience the tokens are requested for (authorization_code grant).
    #[serde(default)]
    pub audience: Option<String>,

    /// Client ID (for public clients or client_secret_post).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (for client_secret_post authentication).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Refresh token (for refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Encoded SAML or JWT assertion (for the bearer assertion grants).
    #[serde(default)]
    pub assertion: Option<String>,

    /// Requested scope.
    #[serde(default)]
    pub scope: Option<String>,

    /// Username (for password grant).
    #[serde(default)]
    pub username: Option<String>,

    /// Password (for password grant).
    #[serde(default)]
    pub password: Option<String>,
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "read_balance",
///   "refresh_token": "abc123..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token (JWT).
    pub access_token: String,

    /// Token type, always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,

    /// Refresh token (not issued for assertion grants).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Creates a new token response with required fields.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

/// Token error response.
///
/// # Example Response
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "Authorization code has expired"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenError {
    /// OAuth 2.0 error code.
    pub error: TokenErrorCode,

    /// Human-readable error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    /// Creates a new token error.
    #[must_use]
    pub fn new(error: TokenErrorCode) -> Self {
        Self {
            error,
            error_description: None,
        }
    }

    /// Creates a new token error with description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }
}

impl From<&AuthError> for TokenError {
    fn from(err: &AuthError) -> Self {
        let code = TokenErrorCode::from_auth_error(err);
        if err.is_server_error() {
            // Keep backend details out of responses.
            let description = match code {
                TokenErrorCode::TemporarilyUnavailable => "Service temporarily unavailable",
                _ => "Internal server error",
            };
            return Self::with_description(code, description);
        }
        Self::with_description(code, err.to_string())
    }
}

/// OAuth 2.0 token error codes.
///
/// Defined in RFC 6749 Section 5.2, plus the two server-side codes of
/// Section 4.1.2.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    /// The request is missing a required parameter, includes an unsupported
    /// parameter value, or is otherwise malformed.
    InvalidRequest,

    /// Client authentication failed.
    InvalidClient,

    /// The authorization grant, refresh token or assertion is invalid,
    /// expired, already used, or was issued to another client.
    InvalidGrant,

    /// The authenticated client is not authorized to use this grant type.
    UnauthorizedClient,

    /// The grant type is not supported by the authorization server.
    UnsupportedGrantType,

    /// The requested scope is invalid or exceeds the granted scope.
    InvalidScope,

    /// The resource owner denied the request.
    AccessDenied,

    /// A backing store did not answer in time.
    TemporarilyUnavailable,

    /// Unexpected server-side failure.
    ServerError,
}

impl TokenErrorCode {
    /// Maps an error to its wire code.
    #[must_use]
    pub fn from_auth_error(err: &AuthError) -> Self {
        match err.oauth_error_code() {
            "invalid_request" => Self::InvalidRequest,
            "invalid_client" => Self::InvalidClient,
            "invalid_grant" => Self::InvalidGrant,
            "unauthorized_client" => Self::UnauthorizedClient,
            "unsupported_grant_type" => Self::UnsupportedGrantType,
            "invalid_scope" => Self::InvalidScope,
            "access_denied" => Self::AccessDenied,
            "temporarily_unavailable" => Self::TemporarilyUnavailable,
            _ => Self::ServerError,
        }
    }

    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::AccessDenied => "access_denied",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code for this error at the token endpoint.
    ///
    /// Every client-side failure, `invalid_client` included, is a 400.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AccessDenied => 401,
            Self::TemporarilyUnavailable => 503,
            Self::ServerError => 500,
            Self::InvalidRequest
            | Self::InvalidClient
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::InvalidScope => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_deserialization() {
        let json = r#"{
            "grant_type": "authorization_code",
            "code": "SplxlOBeZQQYbYS6WxSbIA",
            "redirect_uri": "http://localhost:8080/callback",
            "client_id": "consumer-id"
        }"#;

        let request: TokenRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.grant_type.as_deref(), Some("authorization_code"));
        assert_eq!(request.code.as_deref(), Some("SplxlOBeZQQYbYS6WxSbIA"));
        assert_eq!(
            request.redirect_uri.as_deref(),
            Some("http://localhost:8080/callback")
        );
        assert_eq!(request.client_id.as_deref(), Some("consumer-id"));
        assert!(request.client_secret.is_none());
        assert!(request.assertion.is_none());
    }

    #[test]
    fn test_token_request_without_grant_type() {
        let request: TokenRequest = serde_json::from_str(r#"{"client_id": "c"}"#).unwrap();
        assert!(request.grant_type.is_none());
    }

    #[test]
    fn test_token_response_serialization() {
        let response =
            TokenResponse::new("eyJhbGciOiJSUzI1NiJ9...".to_string(), 3600, "read_balance".to_string());

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""access_token":"eyJhbGciOiJSUzI1NiJ9...""#));
        assert!(json.contains(r#""token_type":"Bearer""#));
        assert!(json.contains(r#""expires_in":3600"#));
        assert!(json.contains(r#""scope":"read_balance""#));
        assert!(!json.contains(r#""refresh_token":"#));

        let with_refresh = response.with_refresh_token("refresh-token".to_string());
        let json = serde_json::to_string(&with_refresh).unwrap();
        assert!(json.contains(r#""refresh_token":"refresh-token""#));
    }

    #[test]
    fn test_empty_scope_omitted() {
        let response = TokenResponse::new("a".to_string(), 60, String::new());
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("scope"));
    }

    #[test]
    fn test_token_error_without_description() {
        let error = TokenError::new(TokenErrorCode::InvalidClient);

        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains(r#""error":"invalid_client""#));
        assert!(!json.contains("error_description"));
    }

    #[test]
    fn test_assertion_errors_fold_to_invalid_grant() {
        let error = TokenError::from(&AuthError::audience_mismatch("wrong audience"));
        assert_eq!(error.error, TokenErrorCode::InvalidGrant);

        let error = TokenError::from(&AuthError::IssuerRequired);
        assert_eq!(error.error, TokenErrorCode::InvalidGrant);
    }

    #[test]
    fn test_server_errors_hide_details() {
        let error = TokenError::from(&AuthError::storage("connection reset by 10.0.0.3"));
        assert_eq!(error.error, TokenErrorCode::ServerError);
        assert!(!error.error_description.unwrap().contains("10.0.0.3"));

        let error = TokenError::from(&AuthError::service_unavailable("code store timed out"));
        assert_eq!(error.error, TokenErrorCode::TemporarilyUnavailable);
        assert_eq!(error.error.http_status(), 503);
    }

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(TokenErrorCode::InvalidRequest.http_status(), 400);
        assert_eq!(TokenErrorCode::InvalidClient.http_status(), 400);
        assert_eq!(TokenErrorCode::InvalidGrant.http_status(), 400);
        assert_eq!(TokenErrorCode::UnsupportedGrantType.http_status(), 400);
        assert_eq!(TokenErrorCode::ServerError.http_status(), 500);
    }

    #[test]
    fn test_error_code_wire_names() {
        for code in [
            TokenErrorCode::InvalidRequest,
            TokenErrorCode::InvalidClient,
            TokenErrorCode::InvalidGrant,
            TokenErrorCode::UnauthorizedClient,
            TokenErrorCode::UnsupportedGrantType,
            TokenErrorCode::InvalidScope,
            TokenErrorCode::AccessDenied,
            TokenErrorCode::TemporarilyUnavailable,
            TokenErrorCode::ServerError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
