//! OAuth 2.0 authorization server front half.
//!
//! This module provides:
//!
//! - [`authorize`] - Request/response types for the authorization endpoint
//! - [`service`] - Authorization service with validation logic
//! - [`token`] - Request/response types for the token endpoint
//! - [`grant`] - Typed grant parsing for token requests
//! - [`client_auth`] - Client and resource owner authentication
//!
//! # Example
//!
//! ```ignore
//! use tollgate_auth::oauth::{AuthorizationConfig, AuthorizationService};
//!
//! let service = AuthorizationService::new(stores, AuthorizationConfig::from(&config));
//! let location = service.authorize(&request, Some(("alice", "alice"))).await?;
//! ```

pub mod authorize;
pub mod client_auth;
pub mod grant;
pub mod service;
pub mod token;

// Authorization endpoint types
pub use authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationFailure, AuthorizationRequest,
    AuthorizationResponse,
};

// Client authentication
pub use client_auth::{
    AuthenticatedClient, TokenEndpointAuthMethod, authenticate_client,
    authenticate_resource_owner, parse_basic_auth,
};

// Grant parsing
pub use grant::GrantRequest;

// Service types
pub use service::{AuthorizationConfig, AuthorizationService, ValidatedAuthorization};

// Token endpoint types
pub use token::{TokenError, TokenErrorCode, TokenRequest, TokenResponse};
