//! Typed token request grants.
//!
//! A [`TokenRequest`] is parsed into exactly one [`GrantRequest`] variant
//! before any store is touched, so a missing parameter is reported as
//! `invalid_request` regardless of client or grant state.

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::token::TokenRequest;
use crate::types::{GrantType, scope};

/// A token request's grant, with the parameters that grant requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantRequest {
    AuthorizationCode {
        code: String,
        redirect_uri: Option<String>,
        audience: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
        scopes: Option<Vec<String>>,
    },
    Password {
        username: String,
        password: String,
        scopes: Option<Vec<String>>,
    },
    Saml2Bearer {
        assertion: String,
        scopes: Option<Vec<String>>,
    },
    JwtBearer {
        assertion: String,
        scopes: Option<Vec<String>>,
    },
}

impl GrantRequest {
    /// Parses the grant of a token request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if `grant_type` or a parameter required by
    /// the grant is missing, and `UnsupportedGrantType` for an unknown
    /// `grant_type`.
    pub fn from_request(request: &TokenRequest) -> AuthResult<Self> {
        let grant_type = request
            .grant_type
            .as_deref()
            .filter(|g| !g.is_empty())
            .ok_or_else(|| AuthError::invalid_request("grant_type is required"))?;

        let grant_type = GrantType::from_wire(grant_type)
            .ok_or_else(|| AuthError::unsupported_grant_type(grant_type))?;

        let scopes = request
            .scope
            .as_deref()
            .map(scope::parse)
            .filter(|s| !s.is_empty());

        let grant = match grant_type {
            GrantType::AuthorizationCode => Self::AuthorizationCode {
                code: required(&request.code, "code")?,
                redirect_uri: request.redirect_uri.clone(),
                audience: request.audience.clone(),
            },
            GrantType::RefreshToken => Self::RefreshToken {
                refresh_token: required(&request.refresh_token, "refresh_token")?,
                scopes,
            },
            GrantType::Password => Self::Password {
                username: required(&request.username, "username")?,
                password: required(&request.password, "password")?,
                scopes,
            },
            GrantType::Saml2Bearer => Self::Saml2Bearer {
                assertion: required(&request.assertion, "assertion")?,
                scopes,
            },
            GrantType::JwtBearer => Self::JwtBearer {
                assertion: required(&request.assertion, "assertion")?,
                scopes,
            },
        };

        Ok(grant)
    }

    /// The grant type tag of this request.
    #[must_use]
    pub fn grant_type(&self) -> GrantType {
        match self {
            Self::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            Self::RefreshToken { .. } => GrantType::RefreshToken,
            Self::Password { .. } => GrantType::Password,
            Self::Saml2Bearer { .. } => GrantType::Saml2Bearer,
            Self::JwtBearer { .. } => GrantType::JwtBearer,
        }
    }
}

fn required(value: &Option<String>, name: &str) -> AuthResult<String> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::invalid_request(format!("{name} is required")))
}
