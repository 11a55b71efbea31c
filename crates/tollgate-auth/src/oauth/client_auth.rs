//! Client and resource owner authentication.
//!
//! # Client authentication methods
//!
//! - `none` - Public clients (client_id only)
//! - `client_secret_basic` - HTTP Basic Auth with client_id:client_secret
//! - `client_secret_post` - client_id and client_secret in request body
//!
//! The client_id may arrive in the Basic header, in the body, or in both;
//! when both are present they must agree.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::token::TokenRequest;
use crate::secret::{verify_secret, verify_unknown_account};
use crate::storage::{ClientStorage, UserStorage, bounded};
use crate::types::{Client, User};

/// Result of successful client authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// The authenticated client.
    pub client: Client,

    /// The authentication method used.
    pub auth_method: TokenEndpointAuthMethod,
}

/// Token endpoint authentication methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// No client authentication (public clients).
    None,

    /// Client secret via HTTP Basic Auth.
    ClientSecretBasic,

    /// Client secret in request body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticates the client making a token request.
///
/// # Arguments
///
/// * `request` - The token request (body `client_id` / `client_secret`)
/// * `basic_auth` - HTTP Basic credentials, if the header was sent
/// * `client_storage` - The client registry
/// * `timeout` - Upper bound for the registry lookup
///
/// # Errors
///
/// Returns:
/// - `InvalidRequest` if no client_id was sent at all
/// - `InvalidClient` if the header and body name different clients, the
///   client is unknown or inactive, a confidential client's secret is
///   missing or wrong, or a public client sends a secret
/// - `ServiceUnavailable` if the registry does not answer in time
pub async fn authenticate_client(
    request: &TokenRequest,
    basic_auth: Option<(&str, &str)>,
    client_storage: &dyn ClientStorage,
    timeout: Duration,
) -> AuthResult<AuthenticatedClient> {
    // 1. Resolve the claimed client_id
    let client_id = match (basic_auth, request.client_id.as_deref()) {
        (Some((header_id, _)), Some(body_id)) if header_id != body_id => {
            return Err(AuthError::invalid_client(
                "client_id in Authorization header and body differ",
            ));
        }
        (Some((header_id, _)), _) => header_id,
        (None, Some(body_id)) => body_id,
        (None, None) => return Err(AuthError::invalid_request("client_id is required")),
    };

    let (secret, method) = match basic_auth {
        Some((_, secret)) => (
            Some(secret).filter(|s| !s.is_empty()),
            TokenEndpointAuthMethod::ClientSecretBasic,
        ),
        None => (
            request.client_secret.as_deref().filter(|s| !s.is_empty()),
            TokenEndpointAuthMethod::ClientSecretPost,
        ),
    };

    // 2. Look up the registration
    let client = bounded(
        timeout,
        "client lookup",
        client_storage.lookup_client(client_id),
    )
    .await?
    .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

    if !client.active {
        return Err(AuthError::invalid_client("Client is inactive"));
    }

    // 3. Check the secret
    match (&client.client_secret_hash, secret) {
        (Some(hash), Some(secret)) => {
            if !verify_secret(secret, hash) {
                return Err(AuthError::invalid_client("Invalid client secret"));
            }
            Ok(AuthenticatedClient {
                client,
                auth_method: method,
            })
        }
        (Some(_), None) => Err(AuthError::invalid_client(
            "Confidential clients must provide client credentials",
        )),
        (None, Some(_)) => Err(AuthError::invalid_client(
            "Public clients must not send a client secret",
        )),
        (None, None) => Ok(AuthenticatedClient {
            client,
            auth_method: TokenEndpointAuthMethod::None,
        }),
    }
}

/// Checks a resource owner's username and password.
///
/// # Returns
///
/// Returns `None` if the user is unknown, inactive, or the password is
/// wrong. Callers decide how that is reported.
///
/// # Errors
///
/// Returns `ServiceUnavailable` if the user store does not answer in time.
pub async fn authenticate_resource_owner(
    username: &str,
    password: &str,
    user_storage: &dyn UserStorage,
    timeout: Duration,
) -> AuthResult<Option<User>> {
    let user = bounded(
        timeout,
        "user lookup",
        user_storage.find_by_username(username),
    )
    .await?;

    let Some(user) = user else {
        // Unknown names take as long as wrong passwords.
        let _ = verify_unknown_account(password);
        return Ok(None);
    };

    let verified = verify_secret(password, &user.password_hash);
    Ok((user.active && verified).then_some(user))
}

/// Parses HTTP Basic Auth header value.
///
/// # Returns
///
/// Returns `Some((user_id, secret))` if valid, `None` otherwise.
///
/// # Example
///
/// ```ignore
/// let auth_header = "Basic Y2xpZW50X2lkOmNsaWVudF9zZWNyZXQ=";
/// if let Some((id, secret)) = parse_basic_auth(auth_header) {
///     println!("client_id: {}, secret: {}", id, secret);
/// }
/// ```
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Split on first colon (password may contain colons)
    let (user_id, secret) = credentials.split_once(':')?;

    Some((user_id.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::hash_secret;
    use crate::storage::MemoryStore;
    use std::sync::OnceLock;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn secret_hash() -> &'static str {
        static HASH: OnceLock<String> = OnceLock::new();
        HASH.get_or_init(|| hash_secret("s3cret").unwrap())
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_client(Client::new("public-app", "Public"));
        store.insert_client(
            Client::new("backend", "Confidential").with_secret_hash(secret_hash()),
        );
        let mut inactive = Client::new("retired", "Retired");
        inactive.active = false;
        store.insert_client(inactive);
        store.insert_user(User::new("alice", secret_hash()));
        store
    }

    fn request(client_id: Option<&str>, client_secret: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            client_id: client_id.map(String::from),
            client_secret: client_secret.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_authenticate_public_client() {
        let store = store();
        let result = authenticate_client(&request(Some("public-app"), None), None, &store, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result.client.client_id, "public-app");
        assert_eq!(result.auth_method, TokenEndpointAuthMethod::None);
    }

    #[tokio::test]
    async fn test_authenticate_basic_auth() {
        let store = store();
        let result = authenticate_client(
            &request(None, None),
            Some(("backend", "s3cret")),
            &store,
            TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(result.auth_method, TokenEndpointAuthMethod::ClientSecretBasic);
    }

    #[tokio::test]
    async fn test_authenticate_secret_post() {
        let store = store();
        let result = authenticate_client(
            &request(Some("backend"), Some("s3cret")),
            None,
            &store,
            TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(result.auth_method, TokenEndpointAuthMethod::ClientSecretPost);
    }

    #[tokio::test]
    async fn test_missing_client_id() {
        let store = store();
        let err = authenticate_client(&request(None, None), None, &store, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_rejected_clients() {
        let store = store();
        let cases = [
            (request(Some("unknown"), None), None),
            (request(Some("retired"), None), None),
            (request(Some("backend"), Some("wrong")), None),
            (request(Some("backend"), None), None),
            (request(Some("public-app"), Some("s3cret")), None),
            (request(Some("public-app"), None), Some(("backend", "s3cret"))),
        ];

        for (request, basic) in cases {
            let err = authenticate_client(&request, basic, &store, TIMEOUT)
                .await
                .unwrap_err();
            assert!(
                matches!(err, AuthError::InvalidClient { .. }),
                "unexpected {err:?} for {:?}",
                request.client_id
            );
        }
    }

    #[tokio::test]
    async fn test_authenticate_resource_owner() {
        let store = store();

        let user = authenticate_resource_owner("alice", "s3cret", &store, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(user.unwrap().username, "alice");

        assert!(
            authenticate_resource_owner("alice", "wrong", &store, TIMEOUT)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            authenticate_resource_owner("alice2", "s3cret", &store, TIMEOUT)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_owners_rejected() {
        let store = store();
        let mut bob = User::new("bob", secret_hash());
        bob.active = false;
        store.insert_user(bob);

        for username in ["bob", "nobody", ""] {
            assert!(
                authenticate_resource_owner(username, "s3cret", &store, TIMEOUT)
                    .await
                    .unwrap()
                    .is_none(),
                "{username}"
            );
        }
    }

    #[test]
    fn test_parse_basic_auth_valid() {
        // consumer-id:this-is-a-secret
        let header = "Basic Y29uc3VtZXItaWQ6dGhpcy1pcy1hLXNlY3JldA==";
        let (id, secret) = parse_basic_auth(header).unwrap();
        assert_eq!(id, "consumer-id");
        assert_eq!(secret, "this-is-a-secret");
    }

    #[test]
    fn test_parse_basic_auth_colon_in_secret() {
        // client:pass:word
        let (id, secret) = parse_basic_auth("Basic Y2xpZW50OnBhc3M6d29yZA==").unwrap();
        assert_eq!(id, "client");
        assert_eq!(secret, "pass:word");
    }

    #[test]
    fn test_parse_basic_auth_invalid() {
        assert!(parse_basic_auth("Bearer token").is_none());
        assert!(parse_basic_auth("Basic !!!").is_none());
        // no colon
        assert!(parse_basic_auth("Basic Y2xpZW50").is_none());
    }
}
