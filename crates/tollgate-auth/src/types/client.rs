//! OAuth 2.0 client registration types.

use serde::{Deserialize, Serialize};

use crate::types::scope;

// =============================================================================
// Grant Type
// =============================================================================

/// Grant types understood by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code exchange.
    AuthorizationCode,
    /// Refresh token rotation.
    RefreshToken,
    /// Resource owner password credentials.
    Password,
    /// SAML 2.0 bearer assertion (RFC 7522).
    Saml2Bearer,
    /// JWT bearer assertion (RFC 7523).
    JwtBearer,
}

impl GrantType {
    /// Every grant type, in dispatch order.
    pub const ALL: [GrantType; 5] = [
        Self::AuthorizationCode,
        Self::RefreshToken,
        Self::Password,
        Self::Saml2Bearer,
        Self::JwtBearer,
    ];

    /// Returns the `grant_type` value used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
            Self::Saml2Bearer => "urn:ietf:params:oauth:grant-type:saml2-bearer",
            Self::JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
        }
    }

    /// Parses a wire `grant_type` value.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|grant| grant.as_str() == value)
    }

    /// Returns true for grants authenticated by a bearer assertion.
    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::Saml2Bearer | Self::JwtBearer)
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth 2.0 client.
///
/// Clients are owned by the client registry and never mutated by grant
/// processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,

    /// Argon2 hash of the client secret. `None` for public clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_hash: Option<String>,

    /// Human-readable name.
    pub name: String,

    /// Registered redirect URIs, compared by exact string match.
    pub redirect_uris: Vec<String>,

    /// Allowed scopes. Empty means every scope is allowed.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Audiences the client may request tokens for.
    #[serde(default)]
    pub audiences: Vec<String>,

    /// Grant types the client may use.
    pub grant_types: Vec<GrantType>,

    /// Inactive clients are treated as unknown.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Client {
    /// Creates an active public client allowed to use every grant type.
    #[must_use]
    pub fn new(client_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret_hash: None,
            name: name.into(),
            redirect_uris: Vec::new(),
            scopes: Vec::new(),
            audiences: Vec::new(),
            grant_types: GrantType::ALL.to_vec(),
            active: true,
        }
    }

    /// Sets the stored secret hash, making this a confidential client.
    #[must_use]
    pub fn with_secret_hash(mut self, hash: impl Into<String>) -> Self {
        self.client_secret_hash = Some(hash.into());
        self
    }

    /// Adds a registered redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    /// Replaces the allowed scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the allowed audiences.
    #[must_use]
    pub fn with_audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the allowed grant types.
    #[must_use]
    pub fn with_grant_types(mut self, grant_types: impl Into<Vec<GrantType>>) -> Self {
        self.grant_types = grant_types.into();
        self
    }

    /// Returns true if the client authenticates with a secret.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.client_secret_hash.is_some()
    }

    /// Checks if the redirect URI exactly matches a registered URI.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Checks if the given scope is allowed for this client.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|allowed| allowed == scope)
    }

    /// Checks if every requested scope is allowed for this client.
    #[must_use]
    pub fn are_scopes_allowed(&self, scopes: &[String]) -> bool {
        scopes.iter().all(|s| self.is_scope_allowed(s))
    }

    /// Narrows `requested` to the scopes this client may hold.
    #[must_use]
    pub fn intersect_scopes(&self, requested: &[String]) -> Vec<String> {
        if self.scopes.is_empty() {
            return requested.to_vec();
        }
        scope::intersect(requested, &self.scopes)
    }

    /// Checks if the client may request tokens for the audience.
    #[must_use]
    pub fn is_audience_allowed(&self, audience: &str) -> bool {
        self.audiences.iter().any(|allowed| allowed == audience)
    }

    /// Checks if the client may use the grant type.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_grant_type_wire_names() {
        assert_eq!(
            GrantType::from_wire("authorization_code"),
            Some(GrantType::AuthorizationCode)
        );
        assert_eq!(
            GrantType::from_wire("urn:ietf:params:oauth:grant-type:saml2-bearer"),
            Some(GrantType::Saml2Bearer)
        );
        assert_eq!(
            GrantType::from_wire("urn:ietf:params:oauth:grant-type:jwt-bearer"),
            Some(GrantType::JwtBearer)
        );
        assert_eq!(GrantType::from_wire("client_credentials"), None);
        assert_eq!(GrantType::from_wire("unknown"), None);
        assert!(GrantType::JwtBearer.is_assertion());
        assert!(!GrantType::Password.is_assertion());
    }

    #[test]
    fn test_grant_type_config_names() {
        let parsed: Vec<GrantType> =
            serde_json::from_str(r#"["authorization_code", "saml2_bearer", "jwt_bearer"]"#)
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                GrantType::AuthorizationCode,
                GrantType::Saml2Bearer,
                GrantType::JwtBearer
            ]
        );
    }

    #[test]
    fn test_redirect_uri_exact_match() {
        let client = Client::new("consumer-id", "Consumer")
            .with_redirect_uri("http://www.blah.apache.org");

        assert!(client.is_redirect_uri_allowed("http://www.blah.apache.org"));
        assert!(!client.is_redirect_uri_allowed("http://www.blah.apache.org/"));
        assert!(!client.is_redirect_uri_allowed("http://www.blah.bad.apache.org"));
    }

    #[test]
    fn test_empty_scope_list_allows_all() {
        let client = Client::new("c", "C");
        assert!(client.is_scope_allowed("anything"));
        assert_eq!(
            client.intersect_scopes(&scopes(&["a", "b"])),
            scopes(&["a", "b"])
        );
    }

    #[test]
    fn test_scope_restrictions() {
        let client =
            Client::new("c", "C").with_scopes(["read_balance", "create_balance"]);

        assert!(client.are_scopes_allowed(&scopes(&["read_balance"])));
        assert!(!client.are_scopes_allowed(&scopes(&["read_balance", "unknown-scope"])));
        assert_eq!(
            client.intersect_scopes(&scopes(&["read_balance", "unknown-scope"])),
            scopes(&["read_balance"])
        );
    }

    #[test]
    fn test_confidential_and_grants() {
        let client = Client::new("c", "C")
            .with_secret_hash("$argon2id$...")
            .with_grant_types([GrantType::AuthorizationCode]);

        assert!(client.is_confidential());
        assert!(client.is_grant_type_allowed(GrantType::AuthorizationCode));
        assert!(!client.is_grant_type_allowed(GrantType::Password));
    }

    #[test]
    fn test_audiences() {
        let client =
            Client::new("c", "C").with_audiences(["https://localhost:8443/secured/bookstore/books"]);
        assert!(client.is_audience_allowed("https://localhost:8443/secured/bookstore/books"));
        assert!(!client.is_audience_allowed("https://localhost:/secured/bookstore/books"));
    }
}
