//! Authorization endpoint types.
//!
//! # OAuth 2.0 Authorization Code Flow
//!
//! 1. Client sends the resource owner to the authorization endpoint
//! 2. The resource owner authenticates
//! 3. Server redirects back to the client with an authorization code
//! 4. Client exchanges the code at the token endpoint
//!
//! # Error delivery
//!
//! Until the redirect URI has been validated, failures are answered directly
//! (400 JSON). After it, response type failures are delivered by redirect so
//! the client learns about them; see [`AuthorizationFailure`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;

/// Authorization request parameters.
///
/// Received as query string parameters. Every field is optional on the
/// wire so that a missing parameter is reported by validation rather than
/// by the extractor.
///
/// # Example
///
/// ```ignore
/// GET /oauth/authorize?
///   response_type=code
///   &client_id=consumer-id
///   &redirect_uri=http://localhost:8080/callback
///   &scope=read_balance
///   &state=abc123xyz
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    /// Must be "code".
    #[serde(default)]
    pub response_type: Option<String>,

    /// Client identifier issued during registration.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Redirect URI; must exactly match a registered one.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Requested scopes (space-separated).
    #[serde(default)]
    pub scope: Option<String>,

    /// Resource indicator naming the audience of the resulting tokens.
    #[serde(default)]
    pub resource: Option<String>,

    /// Audience of the resulting tokens; an alias of `resource`.
    #[serde(default)]
    pub audience: Option<String>,

    /// Opaque client state, echoed back on redirect.
    #[serde(default)]
    pub state: Option<String>,
}

impl AuthorizationRequest {
    /// The requested audience, `resource` taking precedence.
    #[must_use]
    pub fn requested_audience(&self) -> Option<&str> {
        self.resource.as_deref().or(self.audience.as_deref())
    }
}

/// Authorization response parameters, delivered on the redirect URI.
///
/// # Example
///
/// ```ignore
/// HTTP/1.1 303 See Other
/// Location: http://localhost:8080/callback?
///   code=SplxlOBeZQQYbYS6WxSbIA
///   &state=abc123xyz
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    /// Single-use authorization code.
    pub code: String,

    /// Echoed state parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationResponse {
    /// Creates a new authorization response.
    #[must_use]
    pub fn new(code: String, state: Option<String>) -> Self {
        Self { code, state }
    }

    /// Builds the redirect URL with response parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is not an absolute URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("code", &self.code);
            if let Some(ref state) = self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// Authorization error delivered on the redirect URI.
///
/// # Example
///
/// ```ignore
/// HTTP/1.1 303 See Other
/// Location: http://localhost:8080/callback?
///   error=unsupported_response_type
///   &error_description=Unsupported+response_type%3A+token
///   &state=abc123xyz
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationError {
    /// OAuth 2.0 error code.
    pub error: AuthorizationErrorCode,

    /// Human-readable error description (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Echoed state parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationError {
    /// Creates a new authorization error with description.
    #[must_use]
    pub fn with_description(
        error: AuthorizationErrorCode,
        description: impl Into<String>,
        state: Option<String>,
    ) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            state,
        }
    }

    /// Builds the redirect URL with error parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is not an absolute URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("error", self.error.as_str());
            if let Some(ref desc) = self.error_description {
                pairs.append_pair("error_description", desc);
            }
            if let Some(ref state) = self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// OAuth 2.0 authorization error codes (RFC 6749 Section 4.1.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationErrorCode {
    /// A required parameter is missing or malformed.
    InvalidRequest,

    /// The server does not support this response type.
    UnsupportedResponseType,
}

impl AuthorizationErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnsupportedResponseType => "unsupported_response_type",
        }
    }
}

impl fmt::Display for AuthorizationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a failed authorization request is answered.
#[derive(Debug)]
pub enum AuthorizationFailure {
    /// Answered directly; the redirect URI is unknown or untrusted.
    Direct(AuthError),

    /// Delivered to the validated redirect URI.
    Redirect {
        redirect_uri: String,
        error: AuthorizationError,
    },
}

impl From<AuthError> for AuthorizationFailure {
    fn from(err: AuthError) -> Self {
        Self::Direct(err)
    }
}
