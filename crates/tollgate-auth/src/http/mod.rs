//! HTTP handlers for OAuth 2.0 endpoints.
//!
//! This module provides Axum handlers for the two grant-processing
//! endpoints and a router mounting them.
//!
//! # Available Handlers
//!
//! - [`authorize`] - Authorization endpoint (RFC 6749 Section 4.1.1)
//! - [`token`] - Token endpoint (RFC 6749 Section 3.2, RFC 7522, RFC 7523)

pub mod authorize;
pub mod token;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::oauth::service::AuthorizationService;
use crate::token::service::TokenService;

pub use authorize::authorize_handler;
pub use token::token_handler;

/// Shared state of the OAuth endpoints.
#[derive(Clone)]
pub struct OAuthState {
    /// Authorization service for creating codes.
    pub authorization_service: Arc<AuthorizationService>,
    /// Token service dispatching grants.
    pub token_service: Arc<TokenService>,
}

impl OAuthState {
    /// Creates a new OAuth state.
    pub fn new(
        authorization_service: Arc<AuthorizationService>,
        token_service: Arc<TokenService>,
    ) -> Self {
        Self {
            authorization_service,
            token_service,
        }
    }
}

/// Builds the router serving `GET /oauth/authorize` and `POST /oauth/token`.
pub fn oauth_router(state: OAuthState) -> Router {
    Router::new()
        .route("/oauth/authorize", get(authorize_handler))
        .route("/oauth/token", post(token_handler))
        .with_state(state)
}
