//! Token service: the grant dispatcher behind the token endpoint.
//!
//! This module handles every supported grant:
//!
//! - Authorization code exchange
//! - Refresh token rotation
//! - Resource owner password credentials
//! - SAML 2.0 and JWT bearer assertions
//!
//! # Request processing
//!
//! 1. Parse the grant (`invalid_request`, `unsupported_grant_type`)
//! 2. Authenticate the client (`invalid_request`, `invalid_client`)
//! 3. Check the client may use the grant (`unauthorized_client`)
//! 4. Run the grant
//!
//! Assertion validator failures are logged with their specific kind and
//! answered as `invalid_grant`.
//!
//! # Usage
//!
//! ```ignore
//! use tollgate_auth::token::TokenService;
//!
//! let service = TokenService::new(jwt_service, stores, &auth_config);
//! let response = service.dispatch(&request, basic_credentials).await?;
//! ```

use std::sync::Arc;
use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::assertion::{
    AssertionContext, AssertionValidator, JwtBearerValidator, Saml2BearerValidator,
};
use crate::config::{AuthConfig, to_time_duration};
use crate::error::AuthError;
use crate::oauth::client_auth::{authenticate_client, authenticate_resource_owner};
use crate::oauth::grant::GrantRequest;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::storage::{Stores, bounded};
use crate::token::jwt::{AccessTokenClaims, JwtService};
use crate::types::{AccessToken, Client, RefreshToken, scope};

/// Configuration for the token service.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Access token lifetime.
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    pub refresh_token_lifetime: Duration,

    /// Upper bound for each store call.
    pub operation_timeout: StdDuration,
}

impl From<&AuthConfig> for TokenConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            access_token_lifetime: to_time_duration(config.oauth.access_token_lifetime),
            refresh_token_lifetime: to_time_duration(config.oauth.refresh_token_lifetime),
            operation_timeout: config.storage.operation_timeout,
        }
    }
}

/// Tokens minted for one grant, not yet persisted.
struct MintedTokens {
    access_token: String,
    access_record: AccessToken,
    refresh: Option<(String, RefreshToken)>,
}

/// Token service for processing token requests.
pub struct TokenService {
    /// JWT service for signing access tokens.
    jwt_service: Arc<JwtService>,

    stores: Stores,

    saml2_validator: Saml2BearerValidator,

    jwt_validator: JwtBearerValidator,

    /// Service configuration.
    config: TokenConfig,
}

impl TokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(jwt_service: Arc<JwtService>, stores: Stores, auth_config: &AuthConfig) -> Self {
        let context =
            AssertionContext::new(auth_config, stores.trust.clone(), stores.replay.clone());

        Self {
            jwt_service,
            saml2_validator: Saml2BearerValidator::new(context.clone()),
            jwt_validator: JwtBearerValidator::new(context),
            stores,
            config: TokenConfig::from(auth_config),
        }
    }

    /// Processes a token request.
    ///
    /// # Arguments
    ///
    /// * `request` - The form-decoded token request
    /// * `basic_auth` - HTTP Basic client credentials, if sent
    ///
    /// # Errors
    ///
    /// Returns the error to report on the wire; assertion validator errors
    /// have already been folded into `InvalidGrant`.
    pub async fn dispatch(
        &self,
        request: &TokenRequest,
        basic_auth: Option<(&str, &str)>,
    ) -> AuthResult<TokenResponse> {
        // 1. Parse the grant
        let grant = GrantRequest::from_request(request)?;
        let grant_type = grant.grant_type();

        // 2. Authenticate the client
        let authenticated = authenticate_client(
            request,
            basic_auth,
            self.stores.clients.as_ref(),
            self.config.operation_timeout,
        )
        .await?;
        let client = authenticated.client;

        // 3. Validate grant type is allowed
        if !client.is_grant_type_allowed(grant_type) {
            return Err(AuthError::unauthorized_client(format!(
                "Client is not allowed to use grant type {grant_type}"
            )));
        }

        // 4. Run the grant
        let response = match grant {
            GrantRequest::AuthorizationCode {
                code,
                redirect_uri,
                audience,
            } => {
                self.exchange_code(&client, &code, redirect_uri.as_deref(), audience.as_deref())
                    .await?
            }
            GrantRequest::RefreshToken {
                refresh_token,
                scopes,
            } => self.refresh(&client, &refresh_token, scopes).await?,
            GrantRequest::Password {
                username,
                password,
                scopes,
            } => self.password(&client, &username, &password, scopes).await?,
            GrantRequest::Saml2Bearer { assertion, scopes } => {
                self.assertion_grant(&client, &self.saml2_validator, &assertion, scopes)
                    .await?
            }
            GrantRequest::JwtBearer { assertion, scopes } => {
                self.assertion_grant(&client, &self.jwt_validator, &assertion, scopes)
                    .await?
            }
        };

        tracing::info!(
            client_id = %client.client_id,
            grant_type = %grant_type,
            auth_method = %authenticated.auth_method,
            refresh = response.refresh_token.is_some(),
            "Token issued"
        );

        Ok(response)
    }

    /// Exchanges an authorization code for an access and refresh token.
    async fn exchange_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: Option<&str>,
        audience: Option<&str>,
    ) -> AuthResult<TokenResponse> {
        // 1. Validate the requested audience before burning the code
        if let Some(audience) = audience
            && !client.is_audience_allowed(audience)
        {
            return Err(AuthError::invalid_grant(format!(
                "Audience '{audience}' is not allowed for this client"
            )));
        }

        // 2. Atomically check and consume the code; a requested audience
        //    must be the one the code was issued for
        let authorization = bounded(
            self.config.operation_timeout,
            "code consume",
            self.stores
                .codes
                .consume(code, &client.client_id, redirect_uri, audience),
        )
        .await?;

        // 3. Issue tokens bound to the code
        let minted = self.mint(
            &client.client_id,
            &authorization.subject,
            &authorization.scopes,
            authorization.audience.into_iter().collect(),
            true,
        )?;
        self.persist(&minted).await?;

        Ok(minted.into_response(self.expires_in()))
    }

    /// Rotates a refresh token, issuing a new access and refresh token.
    async fn refresh(
        &self,
        client: &Client,
        refresh_token: &str,
        requested_scopes: Option<Vec<String>>,
    ) -> AuthResult<TokenResponse> {
        let token_hash = RefreshToken::hash_token(refresh_token);

        // 1. Find the refresh token
        let existing = bounded(
            self.config.operation_timeout,
            "refresh token lookup",
            self.stores.refresh_tokens.find_by_hash(&token_hash),
        )
        .await?
        .ok_or_else(|| AuthError::invalid_grant("Unknown refresh token"))?;

        // 2. Validate it is still usable by this client
        existing.check_usable(&client.client_id, OffsetDateTime::now_utc())?;

        // 3. Determine scope: may narrow, never widen
        let scopes = match requested_scopes {
            Some(requested) if !scope::is_subset(&requested, &existing.scopes) => {
                return Err(AuthError::invalid_scope(
                    "Requested scope exceeds the originally granted scope",
                ));
            }
            Some(requested) => requested,
            None => existing.scopes.clone(),
        };

        // 4. Mint the replacement pair
        let minted = self.mint(
            &client.client_id,
            &existing.subject,
            &scopes,
            existing.audience.clone(),
            true,
        )?;
        let Some((_, ref replacement)) = minted.refresh else {
            return Err(AuthError::internal("Refresh token was not minted"));
        };

        // 5. Atomically consume the old token in favour of the new one
        bounded(
            self.config.operation_timeout,
            "refresh token rotation",
            self.stores
                .refresh_tokens
                .rotate(&token_hash, &client.client_id, replacement),
        )
        .await?;

        // 6. Store the access token record
        bounded(
            self.config.operation_timeout,
            "access token insert",
            self.stores.access_tokens.create(&minted.access_record),
        )
        .await?;

        tracing::debug!(
            client_id = %client.client_id,
            previous = %existing.id,
            replacement = %replacement.id,
            "Refresh token rotated"
        );

        Ok(minted.into_response(self.expires_in()))
    }

    /// Resource owner password credentials grant.
    async fn password(
        &self,
        client: &Client,
        username: &str,
        password: &str,
        requested_scopes: Option<Vec<String>>,
    ) -> AuthResult<TokenResponse> {
        // 1. Authenticate the resource owner
        let user = authenticate_resource_owner(
            username,
            password,
            self.stores.users.as_ref(),
            self.config.operation_timeout,
        )
        .await?
        .ok_or_else(|| AuthError::invalid_grant("Invalid username or password"))?;

        // 2. Validate scopes are allowed for this client
        let scopes = match requested_scopes {
            Some(requested) => {
                if !client.are_scopes_allowed(&requested) {
                    return Err(AuthError::invalid_scope(
                        "Requested scope is not allowed for this client",
                    ));
                }
                requested
            }
            None => client.scopes.clone(),
        };

        // 3. Issue tokens
        let minted = self.mint(
            &client.client_id,
            &user.username,
            &scopes,
            client.audiences.clone(),
            true,
        )?;
        self.persist(&minted).await?;

        Ok(minted.into_response(self.expires_in()))
    }

    /// SAML 2.0 / JWT bearer assertion grant. Issues an access token only.
    async fn assertion_grant(
        &self,
        client: &Client,
        validator: &dyn AssertionValidator,
        assertion: &str,
        requested_scopes: Option<Vec<String>>,
    ) -> AuthResult<TokenResponse> {
        // 1. Validate the assertion, folding validator kinds into invalid_grant
        let validated = validator.validate(assertion).await.map_err(|e| {
            if e.is_assertion_error() {
                tracing::warn!(
                    client_id = %client.client_id,
                    kind = e.kind(),
                    error = %e,
                    "Bearer assertion rejected"
                );
                AuthError::invalid_grant("Assertion rejected")
            } else {
                e
            }
        })?;

        // 2. Scope: the assertion's grant, narrowed by the request, within the
        //    client's allowance. An assertion without scopes leaves the request
        //    bounded by the client alone.
        let candidates = match requested_scopes {
            Some(requested) if validated.scopes.is_empty() => requested,
            Some(requested) => scope::intersect(&requested, &validated.scopes),
            None => validated.scopes.clone(),
        };
        let scopes = client.intersect_scopes(&candidates);

        // 3. Issue an access token for the assertion subject
        let minted = self.mint(
            &client.client_id,
            &validated.subject,
            &scopes,
            validated.audiences.clone(),
            false,
        )?;
        self.persist(&minted).await?;

        tracing::debug!(
            client_id = %client.client_id,
            issuer = %validated.issuer,
            subject = %validated.subject,
            "Bearer assertion exchanged"
        );

        Ok(minted.into_response(self.expires_in()))
    }

    /// Builds signed tokens and their records without storing anything.
    fn mint(
        &self,
        client_id: &str,
        subject: &str,
        scopes: &[String],
        audience: Vec<String>,
        with_refresh: bool,
    ) -> AuthResult<MintedTokens> {
        let now = OffsetDateTime::now_utc();
        let access_id = Uuid::new_v4();

        let refresh = with_refresh.then(|| {
            let value = RefreshToken::generate_token();
            let record = RefreshToken {
                id: Uuid::new_v4(),
                token_hash: RefreshToken::hash_token(&value),
                client_id: client_id.to_string(),
                subject: subject.to_string(),
                scopes: scopes.to_vec(),
                audience: audience.clone(),
                access_token_id: access_id,
                issued_at: now,
                expires_at: now + self.config.refresh_token_lifetime,
                consumed_at: None,
                replaced_by: None,
            };
            (value, record)
        });

        let access_record = AccessToken {
            id: access_id,
            client_id: client_id.to_string(),
            subject: subject.to_string(),
            scopes: scopes.to_vec(),
            audience,
            issued_at: now,
            expires_at: now + self.config.access_token_lifetime,
            refresh_token_id: refresh.as_ref().map(|(_, record)| record.id),
        };

        let claims = AccessTokenClaims {
            iss: self.jwt_service.issuer().to_string(),
            sub: access_record.subject.clone(),
            aud: access_record.audience.clone(),
            exp: access_record.expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: access_id.to_string(),
            scope: scope::join(&access_record.scopes),
            client_id: access_record.client_id.clone(),
        };

        let access_token = self
            .jwt_service
            .encode(&claims)
            .map_err(|e| AuthError::internal(format!("Failed to sign access token: {e}")))?;

        Ok(MintedTokens {
            access_token,
            access_record,
            refresh,
        })
    }

    /// Stores freshly minted records.
    async fn persist(&self, minted: &MintedTokens) -> AuthResult<()> {
        if let Some((_, ref record)) = minted.refresh {
            bounded(
                self.config.operation_timeout,
                "refresh token insert",
                self.stores.refresh_tokens.create(record),
            )
            .await?;
        }

        bounded(
            self.config.operation_timeout,
            "access token insert",
            self.stores.access_tokens.create(&minted.access_record),
        )
        .await
    }

    fn expires_in(&self) -> u64 {
        u64::try_from(self.config.access_token_lifetime.whole_seconds()).unwrap_or(0)
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }
}

impl MintedTokens {
    fn into_response(self, expires_in: u64) -> TokenResponse {
        let response = TokenResponse::new(
            self.access_token,
            expires_in,
            scope::join(&self.access_record.scopes),
        );
        match self.refresh {
            Some((value, _)) => response.with_refresh_token(value),
            None => response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::hash_secret;
    use crate::storage::{CodeStorage, MemoryStore, RefreshTokenStorage};
    use crate::token::jwt::{SigningAlgorithm, SigningKeyPair};
    use crate::types::{AuthorizationCode, GrantType, User};
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use std::sync::OnceLock;

    const CALLBACK: &str = "http://localhost:8080/callback";
    const BOOKS: &str = "https://localhost:8443/secured/bookstore/books";
    const JOURNALS: &str = "https://localhost:8443/secured/bookstore/journals";

    fn signing_pem() -> &'static str {
        static PEM: OnceLock<String> = OnceLock::new();
        PEM.get_or_init(|| {
            let key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
            key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
        })
    }

    fn password_hash() -> &'static str {
        static HASH: OnceLock<String> = OnceLock::new();
        HASH.get_or_init(|| hash_secret("alice").unwrap())
    }

    fn jwt_service() -> Arc<JwtService> {
        let key = SigningKeyPair::from_pem("test", SigningAlgorithm::RS256, signing_pem()).unwrap();
        Arc::new(JwtService::new(key, "http://localhost:8080"))
    }

    fn setup() -> (TokenService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_client(
            Client::new("consumer-id", "Consumer")
                .with_redirect_uri(CALLBACK)
                .with_scopes(["read_balance", "create_balance"])
                .with_audiences([BOOKS, JOURNALS]),
        );
        store.insert_client(
            Client::new("code-only", "Code only")
                .with_redirect_uri(CALLBACK)
                .with_grant_types([GrantType::AuthorizationCode]),
        );
        store.insert_user(User::new("alice", password_hash()));

        let service = TokenService::new(
            jwt_service(),
            Stores::in_memory(store.clone()),
            &AuthConfig::default(),
        );
        (service, store)
    }

    async fn seed_code(store: &MemoryStore, client_id: &str, audience: Option<&str>) -> String {
        let now = OffsetDateTime::now_utc();
        let code = AuthorizationCode {
            code: AuthorizationCode::generate_code(),
            client_id: client_id.to_string(),
            redirect_uri: CALLBACK.to_string(),
            redirect_uri_requested: true,
            scopes: vec!["read_balance".to_string()],
            subject: "alice".to_string(),
            audience: audience.map(String::from),
            issued_at: now,
            expires_at: now + Duration::minutes(10),
            consumed_at: None,
        };
        CodeStorage::create(store, &code).await.unwrap();
        code.code
    }

    fn code_request(code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            code: Some(code.to_string()),
            redirect_uri: Some(CALLBACK.to_string()),
            client_id: Some("consumer-id".to_string()),
            ..Default::default()
        }
    }

    fn refresh_request(refresh_token: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("refresh_token".to_string()),
            refresh_token: Some(refresh_token.to_string()),
            client_id: Some("consumer-id".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let (service, store) = setup();
        let code = seed_code(&store, "consumer-id", Some(BOOKS)).await;

        let response = service.dispatch(&code_request(&code), None).await.unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.scope, "read_balance");
        assert_eq!(response.expires_in, 3600);
        assert!(response.refresh_token.is_some());

        let claims = service
            .jwt_service
            .decode::<AccessTokenClaims>(&response.access_token)
            .unwrap()
            .claims;
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.aud, vec![BOOKS.to_string()]);
        assert_eq!(claims.client_id, "consumer-id");
    }

    #[tokio::test]
    async fn test_code_single_use() {
        let (service, store) = setup();
        let code = seed_code(&store, "consumer-id", None).await;

        service.dispatch(&code_request(&code), None).await.unwrap();
        let err = service
            .dispatch(&code_request(&code), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_code_audience_must_match() {
        let (service, store) = setup();

        let code = seed_code(&store, "consumer-id", None).await;
        let mut request = code_request(&code);
        request.audience = Some(BOOKS.to_string());
        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));

        let code = seed_code(&store, "consumer-id", Some(BOOKS)).await;
        let mut request = code_request(&code);
        request.audience = Some("https://elsewhere.example.com".to_string());
        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));

        // the rejected audience did not burn the code
        request.audience = Some(BOOKS.to_string());
        assert!(service.dispatch(&request, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_code_audience_mismatch_keeps_code() {
        let (service, store) = setup();
        let code = seed_code(&store, "consumer-id", Some(BOOKS)).await;

        // allowed for the client, but not the audience the code was issued for
        let mut request = code_request(&code);
        request.audience = Some(JOURNALS.to_string());
        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));

        request.audience = Some(BOOKS.to_string());
        let response = service.dispatch(&request, None).await.unwrap();
        assert!(response.refresh_token.is_some());
    }

    #[tokio::test]
    async fn test_code_for_other_client() {
        let (service, store) = setup();
        let code = seed_code(&store, "code-only", None).await;

        let err = service
            .dispatch(&code_request(&code), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_grant_type_not_allowed() {
        let (service, _) = setup();
        let request = TokenRequest {
            grant_type: Some("password".to_string()),
            username: Some("alice".to_string()),
            password: Some("alice".to_string()),
            client_id: Some("code-only".to_string()),
            ..Default::default()
        };

        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::UnauthorizedClient { .. }));
    }

    #[tokio::test]
    async fn test_refresh_rotation() {
        let (service, store) = setup();
        let code = seed_code(&store, "consumer-id", None).await;
        let first = service.dispatch(&code_request(&code), None).await.unwrap();
        let old = first.refresh_token.unwrap();

        let second = service
            .dispatch(&refresh_request(&old), None)
            .await
            .unwrap();
        let new = second.refresh_token.unwrap();
        assert_ne!(old, new);
        assert_eq!(second.scope, "read_balance");

        let err = service
            .dispatch(&refresh_request(&old), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));

        let rotated = store
            .find_by_hash(&RefreshToken::hash_token(&old))
            .await
            .unwrap()
            .unwrap();
        assert!(rotated.is_consumed());
        assert!(rotated.replaced_by.is_some());

        assert!(service.dispatch(&refresh_request(&new), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_scope_cannot_widen() {
        let (service, store) = setup();
        let code = seed_code(&store, "consumer-id", None).await;
        let first = service.dispatch(&code_request(&code), None).await.unwrap();

        let mut request = refresh_request(&first.refresh_token.unwrap());
        request.scope = Some("read_balance create_balance".to_string());
        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidScope { .. }));
    }

    #[tokio::test]
    async fn test_unknown_refresh_token() {
        let (service, _) = setup();
        let err = service
            .dispatch(&refresh_request("not-a-token"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_password_grant() {
        let (service, _) = setup();
        let mut request = TokenRequest {
            grant_type: Some("password".to_string()),
            username: Some("alice".to_string()),
            password: Some("alice".to_string()),
            scope: Some("read_balance".to_string()),
            client_id: Some("consumer-id".to_string()),
            ..Default::default()
        };

        let response = service.dispatch(&request, None).await.unwrap();
        assert!(response.refresh_token.is_some());
        assert_eq!(response.scope, "read_balance");

        request.scope = Some("delete_balance".to_string());
        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidScope { .. }));

        request.scope = None;
        request.username = Some("alice2".to_string());
        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_assertion_errors_are_folded() {
        let (service, _) = setup();
        let request = TokenRequest {
            grant_type: Some(GrantType::JwtBearer.as_str().to_string()),
            assertion: Some("eyJhbGciOiJub25lIn0.eyJzdWIiOiJhbGljZSJ9.".to_string()),
            client_id: Some("consumer-id".to_string()),
            ..Default::default()
        };

        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_parse_errors_precede_client_checks() {
        let (service, _) = setup();

        let err = service
            .dispatch(&TokenRequest::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));

        let request = TokenRequest {
            grant_type: Some("implicit".to_string()),
            client_id: Some("nobody".to_string()),
            ..Default::default()
        };
        let err = service.dispatch(&request, None).await.unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedGrantType { .. }));
    }
}
