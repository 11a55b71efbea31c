//! # tollgate-auth
//!
//! OAuth 2.0 grant processing core.
//!
//! This crate provides:
//! - An authorization endpoint issuing single-use authorization codes
//! - A token endpoint dispatching the authorization code, refresh token,
//!   password, SAML 2.0 bearer, and JWT bearer grants
//! - SAML 2.0 and JWT bearer assertion validation against a trust store
//! - Atomic check-and-consume stores for codes and refresh tokens
//!
//! ## Error handling
//!
//! Every operation returns [`AuthResult`]. Assertion validators raise
//! specific error kinds; the token endpoint logs the kind and answers
//! `invalid_grant`.
//!
//! ## Modules
//!
//! - [`config`] - Lifetimes, tolerances, signing, and store bounds
//! - [`oauth`] - Authorization endpoint and token request types
//! - [`token`] - Access token signing and the grant dispatcher
//! - [`assertion`] - SAML 2.0 and JWT bearer assertion validators
//! - [`storage`] - Storage traits and the in-memory store
//! - [`http`] - Axum HTTP handlers for OAuth endpoints

pub mod assertion;
pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod secret;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use http::{OAuthState, authorize_handler, oauth_router, token_handler};
pub use storage::{
    AccessTokenStorage, ClientStorage, CodeStorage, MemoryStore, RefreshTokenStorage,
    ReplayCache, Stores, TrustStore, TrustedKey, UserStorage,
};
pub use types::{AccessToken, AuthorizationCode, Client, GrantType, RefreshToken, User};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tollgate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::assertion::{AssertionValidator, ValidatedAssertion};
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::http::{OAuthState, oauth_router};
    pub use crate::oauth::{AuthorizationService, TokenRequest, TokenResponse};
    pub use crate::storage::{MemoryStore, Stores, TrustedKey};
    pub use crate::token::{JwtService, SigningAlgorithm, SigningKeyPair, TokenService};
    pub use crate::types::{Client, GrantType, User};
}
