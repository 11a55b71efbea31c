//! OAuth authorization service.
//!
//! Validates authorization requests, authenticates the resource owner, and
//! issues single-use authorization codes.
//!
//! # Check order
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. `client_id` resolves to an active client
//! 2. `redirect_uri` matches a registered URI exactly
//! 3. `response_type` is `code` (reported by redirect from here on)
//! 4. `scope` is allowed for the client
//! 5. `resource` / `audience` is allowed for the client
//! 6. The resource owner authenticates
//!
//! # Usage
//!
//! ```ignore
//! let service = AuthorizationService::new(stores, AuthorizationConfig::from(&auth_config));
//! let location = service.authorize(&request, basic_credentials).await?;
//! ```

use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::config::{AuthConfig, to_time_duration};
use crate::error::AuthError;
use crate::oauth::authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationFailure, AuthorizationRequest,
    AuthorizationResponse,
};
use crate::oauth::client_auth::authenticate_resource_owner;
use crate::storage::{Stores, bounded};
use crate::types::{AuthorizationCode, Client, User, scope};

/// Configuration for the authorization service.
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// Authorization code lifetime. Default: 10 minutes.
    pub code_lifetime: Duration,

    /// Upper bound for each store call.
    pub operation_timeout: StdDuration,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for AuthorizationConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            code_lifetime: to_time_duration(config.oauth.authorization_code_lifetime),
            operation_timeout: config.storage.operation_timeout,
        }
    }
}

/// An authorization request that passed every client-side check.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorization {
    pub client: Client,

    /// Redirect URI the response goes to.
    pub redirect_uri: String,

    /// Whether the request named the redirect URI explicitly.
    pub redirect_uri_requested: bool,

    pub scopes: Vec<String>,

    pub audience: Option<String>,

    pub state: Option<String>,
}

/// Authorization service for handling OAuth 2.0 authorization requests.
pub struct AuthorizationService {
    stores: Stores,
    config: AuthorizationConfig,
}

impl AuthorizationService {
    /// Creates a new authorization service.
    #[must_use]
    pub fn new(stores: Stores, config: AuthorizationConfig) -> Self {
        Self { stores, config }
    }

    /// Handles an authorization request end to end.
    ///
    /// # Arguments
    ///
    /// * `request` - The authorization request parameters
    /// * `owner_credentials` - The resource owner's HTTP Basic credentials
    ///
    /// # Returns
    ///
    /// The redirect URL carrying the new code and the echoed state.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthorizationFailure`] saying how the failure must be
    /// delivered.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        owner_credentials: Option<(&str, &str)>,
    ) -> Result<String, AuthorizationFailure> {
        let validated = self.validate(request).await?;
        let owner = self.authenticate_owner(owner_credentials).await?;
        let code = self.issue_code(&validated, &owner.username).await?;

        AuthorizationResponse::new(code.code, validated.state)
            .to_redirect_url(&validated.redirect_uri)
            .map_err(|e| {
                AuthorizationFailure::Direct(AuthError::invalid_redirect_uri(format!(
                    "Registered redirect_uri is not a valid URL: {e}"
                )))
            })
    }

    /// Validates an authorization request.
    ///
    /// # Errors
    ///
    /// Client and redirect URI failures are `Direct`; a missing or
    /// unsupported `response_type` is a `Redirect`; scope and audience
    /// failures are `Direct`.
    pub async fn validate(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<ValidatedAuthorization, AuthorizationFailure> {
        // 1. Validate client exists and is active
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::invalid_client("Missing required parameter: client_id"))?;

        let client = bounded(
            self.config.operation_timeout,
            "client lookup",
            self.stores.clients.lookup_client(client_id),
        )
        .await?
        .ok_or_else(|| AuthError::invalid_client(format!("Unknown client: {client_id}")))?;

        if !client.active {
            return Err(AuthError::invalid_client("Client is inactive").into());
        }

        // 2. Validate redirect_uri
        let (redirect_uri, redirect_uri_requested) = match request.redirect_uri.as_deref() {
            Some(uri) if client.is_redirect_uri_allowed(uri) => (uri.to_string(), true),
            Some(uri) => {
                return Err(AuthError::invalid_redirect_uri(format!(
                    "redirect_uri '{uri}' is not registered for this client"
                ))
                .into());
            }
            None => match client.redirect_uris.as_slice() {
                [only] => (only.clone(), false),
                _ => {
                    return Err(AuthError::invalid_redirect_uri(
                        "redirect_uri is required when the client registers more than one",
                    )
                    .into());
                }
            },
        };

        // 3. Validate response_type; redirect-safe from here on
        match request.response_type.as_deref() {
            Some("code") => {}
            other => {
                let error = match other {
                    None | Some("") => AuthorizationError::with_description(
                        AuthorizationErrorCode::InvalidRequest,
                        "Missing required parameter: response_type",
                        request.state.clone(),
                    ),
                    Some(unsupported) => AuthorizationError::with_description(
                        AuthorizationErrorCode::UnsupportedResponseType,
                        format!("Unsupported response_type: {unsupported}"),
                        request.state.clone(),
                    ),
                };
                tracing::info!(
                    client_id = %client.client_id,
                    error = %error.error,
                    "Authorization request rejected by redirect"
                );
                return Err(AuthorizationFailure::Redirect {
                    redirect_uri,
                    error,
                });
            }
        }

        // 4. Validate scopes are allowed for this client
        let scopes = match request.scope.as_deref().map(scope::parse) {
            Some(requested) if !requested.is_empty() => {
                if let Some(denied) = requested.iter().find(|s| !client.is_scope_allowed(s)) {
                    return Err(AuthError::invalid_scope(format!(
                        "Scope '{denied}' is not allowed for this client"
                    ))
                    .into());
                }
                requested
            }
            _ => client.scopes.clone(),
        };

        // 5. Validate the requested audience
        let audience = request.requested_audience().map(str::to_string);
        if let Some(ref audience) = audience
            && !client.is_audience_allowed(audience)
        {
            return Err(AuthError::invalid_request(format!(
                "Audience '{audience}' is not allowed for this client"
            ))
            .into());
        }

        Ok(ValidatedAuthorization {
            client,
            redirect_uri,
            redirect_uri_requested,
            scopes,
            audience,
            state: request.state.clone(),
        })
    }

    /// Authenticates the resource owner from HTTP Basic credentials.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if credentials are missing or wrong.
    pub async fn authenticate_owner(
        &self,
        credentials: Option<(&str, &str)>,
    ) -> AuthResult<User> {
        let (username, password) = credentials
            .ok_or_else(|| AuthError::unauthorized("Resource owner authentication required"))?;

        authenticate_resource_owner(
            username,
            password,
            self.stores.users.as_ref(),
            self.config.operation_timeout,
        )
        .await?
        .ok_or_else(|| AuthError::unauthorized("Invalid resource owner credentials"))
    }

    /// Mints and stores an authorization code for a validated request.
    ///
    /// # Errors
    ///
    /// Returns an error if the code store fails or times out.
    pub async fn issue_code(
        &self,
        validated: &ValidatedAuthorization,
        subject: &str,
    ) -> AuthResult<AuthorizationCode> {
        let now = OffsetDateTime::now_utc();
        let code = AuthorizationCode {
            code: AuthorizationCode::generate_code(),
            client_id: validated.client.client_id.clone(),
            redirect_uri: validated.redirect_uri.clone(),
            redirect_uri_requested: validated.redirect_uri_requested,
            scopes: validated.scopes.clone(),
            subject: subject.to_string(),
            audience: validated.audience.clone(),
            issued_at: now,
            expires_at: now + self.config.code_lifetime,
            consumed_at: None,
        };

        bounded(
            self.config.operation_timeout,
            "code store insert",
            self.stores.codes.create(&code),
        )
        .await?;

        tracing::info!(
            client_id = %code.client_id,
            subject = %code.subject,
            scope = %scope::join(&code.scopes),
            "Authorization code issued"
        );

        Ok(code)
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::hash_secret;
    use crate::storage::MemoryStore;
    use std::sync::{Arc, OnceLock};

    const CALLBACK: &str = "http://localhost:8080/callback";

    fn password_hash() -> &'static str {
        static HASH: OnceLock<String> = OnceLock::new();
        HASH.get_or_init(|| hash_secret("alice").unwrap())
    }

    fn service() -> (AuthorizationService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_client(
            Client::new("consumer-id", "Consumer")
                .with_redirect_uri(CALLBACK)
                .with_scopes(["read_balance", "create_balance"])
                .with_audiences(["https://localhost:8443/secured/bookstore/books"]),
        );
        store.insert_client(
            Client::new("multi", "Multi")
                .with_redirect_uri("http://localhost:8080/a")
                .with_redirect_uri("http://localhost:8080/b"),
        );
        store.insert_user(User::new("alice", password_hash()));

        let service = AuthorizationService::new(
            Stores::in_memory(store.clone()),
            AuthorizationConfig::default(),
        );
        (service, store)
    }

    fn request() -> AuthorizationRequest {
        AuthorizationRequest {
            response_type: Some("code".to_string()),
            client_id: Some("consumer-id".to_string()),
            redirect_uri: Some(CALLBACK.to_string()),
            scope: Some("read_balance".to_string()),
            state: Some("xyz".to_string()),
            ..Default::default()
        }
    }

    fn direct(failure: AuthorizationFailure) -> AuthError {
        match failure {
            AuthorizationFailure::Direct(err) => err,
            AuthorizationFailure::Redirect { error, .. } => {
                panic!("expected a direct failure, got redirect {error:?}")
            }
        }
    }

    #[tokio::test]
    async fn test_valid_request() {
        let (service, _) = service();
        let validated = service.validate(&request()).await.unwrap();

        assert_eq!(validated.redirect_uri, CALLBACK);
        assert!(validated.redirect_uri_requested);
        assert_eq!(validated.scopes, vec!["read_balance".to_string()]);
        assert_eq!(validated.state.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_missing_or_unknown_client() {
        let (service, _) = service();

        let mut req = request();
        req.client_id = None;
        let err = direct(service.validate(&req).await.unwrap_err());
        assert!(matches!(err, AuthError::InvalidClient { .. }));

        req.client_id = Some("nobody".to_string());
        let err = direct(service.validate(&req).await.unwrap_err());
        assert!(matches!(err, AuthError::InvalidClient { .. }));
    }

    #[tokio::test]
    async fn test_unregistered_redirect_uri_is_direct() {
        let (service, _) = service();
        let mut req = request();
        req.redirect_uri = Some("http://localhost:8080/callback/evil".to_string());
        // response_type problems must not leak to an unvalidated URI
        req.response_type = Some("token".to_string());

        let err = direct(service.validate(&req).await.unwrap_err());
        assert!(matches!(err, AuthError::InvalidRedirectUri { .. }));
    }

    #[tokio::test]
    async fn test_redirect_uri_defaults_to_single_registration() {
        let (service, _) = service();
        let mut req = request();
        req.redirect_uri = None;

        let validated = service.validate(&req).await.unwrap();
        assert_eq!(validated.redirect_uri, CALLBACK);
        assert!(!validated.redirect_uri_requested);

        req.client_id = Some("multi".to_string());
        let err = direct(service.validate(&req).await.unwrap_err());
        assert!(matches!(err, AuthError::InvalidRedirectUri { .. }));
    }

    #[tokio::test]
    async fn test_response_type_errors_redirect() {
        let (service, _) = service();

        for (response_type, expected) in [
            (None, AuthorizationErrorCode::InvalidRequest),
            (Some("token"), AuthorizationErrorCode::UnsupportedResponseType),
        ] {
            let mut req = request();
            req.response_type = response_type.map(String::from);

            match service.validate(&req).await.unwrap_err() {
                AuthorizationFailure::Redirect {
                    redirect_uri,
                    error,
                } => {
                    assert_eq!(redirect_uri, CALLBACK);
                    assert_eq!(error.error, expected);
                    assert_eq!(error.state.as_deref(), Some("xyz"));
                }
                AuthorizationFailure::Direct(err) => panic!("expected redirect, got {err:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_scope_not_allowed() {
        let (service, _) = service();
        let mut req = request();
        req.scope = Some("read_balance delete_balance".to_string());

        let err = direct(service.validate(&req).await.unwrap_err());
        assert!(matches!(err, AuthError::InvalidScope { .. }));
    }

    #[tokio::test]
    async fn test_scope_defaults_to_registration() {
        let (service, _) = service();
        let mut req = request();
        req.scope = None;

        let validated = service.validate(&req).await.unwrap();
        assert_eq!(validated.scopes.len(), 2);
    }

    #[tokio::test]
    async fn test_audience_checked() {
        let (service, _) = service();
        let mut req = request();
        req.audience = Some("https://localhost:8443/secured/bookstore/books".to_string());
        let validated = service.validate(&req).await.unwrap();
        assert!(validated.audience.is_some());

        req.audience = Some("https://elsewhere.example.com".to_string());
        let err = direct(service.validate(&req).await.unwrap_err());
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_owner_authentication() {
        let (service, _) = service();

        assert_eq!(
            service
                .authenticate_owner(Some(("alice", "alice")))
                .await
                .unwrap()
                .username,
            "alice"
        );

        for credentials in [None, Some(("alice", "wrong")), Some(("alice2", "alice"))] {
            let err = service.authenticate_owner(credentials).await.unwrap_err();
            assert!(matches!(err, AuthError::Unauthorized { .. }));
        }
    }

    #[tokio::test]
    async fn test_authorize_issues_stored_code() {
        let (service, store) = service();
        let location = service
            .authorize(&request(), Some(("alice", "alice")))
            .await
            .unwrap();

        let url = url::Url::parse(&location).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["state"], "xyz");

        let code = &params["code"];
        assert_eq!(code.len(), 43);

        let stored = crate::storage::CodeStorage::consume(
            store.as_ref(),
            code,
            "consumer-id",
            Some(CALLBACK),
            None,
        )
        .await
        .unwrap();
        assert_eq!(stored.subject, "alice");
        assert_eq!(stored.scopes, vec!["read_balance".to_string()]);
    }
}
