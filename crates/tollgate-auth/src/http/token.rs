//! OAuth 2.0 Token endpoint handler.
//!
//! This module provides the HTTP handler for the token endpoint (`/oauth/token`).
//! It supports the following grant types:
//!
//! - `authorization_code` - Exchange authorization code for tokens
//! - `refresh_token` - Rotate a refresh token
//! - `password` - Resource Owner Password Credentials (ROPC)
//! - `urn:ietf:params:oauth:grant-type:saml2-bearer` - SAML 2.0 bearer assertion
//! - `urn:ietf:params:oauth:grant-type:jwt-bearer` - JWT bearer assertion
//!
//! # Example
//!
//! ```ignore
//! // Authorization code grant
//! POST /oauth/token
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=http://localhost:8080/callback
//! &client_id=consumer-id
//!
//! // SAML 2.0 bearer grant
//! POST /oauth/token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Asaml2-bearer
//! &assertion=PHNhbWwyOkFzc2VydGlvbi...
//! ```

use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::oauth::client_auth::parse_basic_auth;
use crate::oauth::token::{TokenError, TokenRequest, TokenResponse};

use super::OAuthState;

/// OAuth 2.0 token endpoint handler.
///
/// Handles POST requests to `/oauth/token` with an
/// `application/x-www-form-urlencoded` body.
///
/// # Client Authentication
///
/// Clients can authenticate using:
/// - HTTP Basic Auth header: `Authorization: Basic <base64(client_id:client_secret)>`
/// - Request body: `client_id` and `client_secret` parameters
/// - Public client: just the `client_id` parameter
///
/// # Response
///
/// - 200 OK: Token issued
/// - 400 Bad Request: Any OAuth error, including `invalid_client`
/// - 503 Service Unavailable: A store did not answer in time
/// - 500 Internal Server Error: Unexpected failure
pub async fn token_handler(
    State(state): State<OAuthState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let Form(request) = match form {
        Ok(form) => form,
        Err(rejection) => {
            debug!(error = %rejection, "Malformed token request body");
            return token_error_response(&AuthError::invalid_request(format!(
                "Malformed request body: {}",
                rejection.body_text()
            )));
        }
    };

    debug!(
        grant_type = ?request.grant_type,
        client_id = ?request.client_id,
        "Processing token request"
    );

    // Extract Basic auth credentials if present
    let basic_auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth);

    let basic_auth_ref = basic_auth
        .as_ref()
        .map(|(id, secret)| (id.as_str(), secret.as_str()));

    match state.token_service.dispatch(&request, basic_auth_ref).await {
        Ok(response) => token_success_response(response),
        Err(e) => {
            if e.is_server_error() {
                warn!(error = %e, kind = e.kind(), "Token request failed");
            } else {
                debug!(error = %e, kind = e.kind(), "Token request rejected");
            }
            token_error_response(&e)
        }
    }
}

/// Build a successful token response.
fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}

/// Build an error response for the token endpoint.
fn token_error_response(error: &AuthError) -> Response {
    let token_error = TokenError::from(error);
    let status = StatusCode::from_u16(token_error.error.http_status())
        .unwrap_or(StatusCode::BAD_REQUEST);

    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(token_error),
    )
        .into_response()
}
