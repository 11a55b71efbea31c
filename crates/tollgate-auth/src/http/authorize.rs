//! OAuth 2.0 authorization endpoint handler.
//!
//! The resource owner authenticates with HTTP Basic credentials on the
//! request itself; there is no login or consent page.
//!
//! # Flow
//!
//! ```text
//! GET /oauth/authorize?client_id=...&redirect_uri=...&response_type=code
//!     ├─► Invalid client/redirect_uri → 400 JSON (no redirect)
//!     ├─► Bad response_type → 303 to redirect_uri with error
//!     ├─► Invalid scope/audience → 400 JSON
//!     ├─► Missing/wrong owner credentials → 401 + WWW-Authenticate
//!     └─► Success → 303 to redirect_uri with code and state
//! ```

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Redirect, Response};
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::oauth::authorize::{AuthorizationFailure, AuthorizationRequest};
use crate::oauth::client_auth::parse_basic_auth;
use crate::oauth::token::TokenError;

use super::OAuthState;

/// Realm announced when resource owner credentials are required.
const REALM: &str = "Basic realm=\"tollgate\"";

/// GET /oauth/authorize handler.
///
/// Validates the authorization request, authenticates the resource owner
/// from the `Authorization` header, and redirects back to the client with a
/// fresh authorization code.
pub async fn authorize_handler(
    State(state): State<OAuthState>,
    headers: HeaderMap,
    Query(params): Query<AuthorizationRequest>,
) -> Response {
    debug!(
        client_id = ?params.client_id,
        response_type = ?params.response_type,
        "Processing authorization request"
    );

    let credentials = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth);

    let credentials_ref = credentials
        .as_ref()
        .map(|(user, password)| (user.as_str(), password.as_str()));

    match state
        .authorization_service
        .authorize(&params, credentials_ref)
        .await
    {
        Ok(location) => {
            info!(client_id = ?params.client_id, "Authorization granted");
            Redirect::to(&location).into_response()
        }
        Err(AuthorizationFailure::Redirect {
            redirect_uri,
            error,
        }) => match error.to_redirect_url(&redirect_uri) {
            Ok(location) => Redirect::to(&location).into_response(),
            Err(e) => direct_error_response(&AuthError::invalid_redirect_uri(format!(
                "Registered redirect_uri is not a valid URL: {e}"
            ))),
        },
        Err(AuthorizationFailure::Direct(e)) => {
            if e.is_server_error() {
                warn!(error = %e, kind = e.kind(), "Authorization request failed");
            } else {
                debug!(error = %e, kind = e.kind(), "Authorization request rejected");
            }
            direct_error_response(&e)
        }
    }
}

/// Builds a non-redirect error response.
fn direct_error_response(error: &AuthError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    let body = Json(TokenError::from(error));

    if status == StatusCode::UNAUTHORIZED {
        return (status, [(header::WWW_AUTHENTICATE, REALM)], body).into_response();
    }

    (status, body).into_response()
}
