//! Authorization server configuration.
//!
//! Lifetimes, assertion validation tolerances, token signing, and store
//! bounds for the grant-processing core.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the grant-processing core.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://auth.example.com"
/// token_endpoint = "https://auth.example.com/oauth/token"
///
/// [auth.oauth]
/// access_token_lifetime = "1h"
/// refresh_token_lifetime = "30d"
///
/// [auth.assertion]
/// clock_skew = "1m"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL placed in the `iss` claim of issued access tokens.
    pub issuer: String,

    /// Canonical URL of the token endpoint.
    /// Bearer assertions must name this URL as their audience.
    pub token_endpoint: String,

    /// OAuth 2.0 lifetimes.
    pub oauth: OAuthConfig,

    /// Bearer assertion validation settings.
    pub assertion: AssertionConfig,

    /// Access token signing configuration.
    pub signing: SigningConfig,

    /// Store access settings.
    pub storage: StorageConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            token_endpoint: "http://localhost:8080/oauth/token".to_string(),
            oauth: OAuthConfig::default(),
            assertion: AssertionConfig::default(),
            signing: SigningConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// OAuth 2.0 lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(600), // 10 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
        }
    }
}

/// Bearer assertion validation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssertionConfig {
    /// Tolerated clock difference when checking assertion time windows.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Reject assertions whose identifier was already presented.
    pub replay_protection: bool,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            clock_skew: Duration::from_secs(60),
            replay_protection: true,
        }
    }
}

/// Access token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm: RS256, RS384 or RS512.
    pub algorithm: String,

    /// PKCS#8 PEM private key. A fresh key is generated at startup when unset.
    pub private_key_pem: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            private_key_pem: None,
        }
    }
}

/// Store access settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Upper bound for any single registry, trust store, or token store call.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is empty, the token endpoint is not an
    /// absolute URL, the signing algorithm is unsupported, or any lifetime or
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("auth.issuer".to_string()));
        }

        if self.token_endpoint.is_empty() {
            return Err(ConfigError::Missing("auth.token_endpoint".to_string()));
        }

        url::Url::parse(&self.token_endpoint).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "token_endpoint '{}' is not an absolute URL: {}",
                self.token_endpoint, e
            ))
        })?;

        match self.signing.algorithm.as_str() {
            "RS256" | "RS384" | "RS512" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be RS256, RS384, or RS512",
                    other
                )));
            }
        }

        if self.oauth.authorization_code_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "authorization_code_lifetime must be > 0".to_string(),
            ));
        }

        if self.oauth.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.oauth.refresh_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.storage.operation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "storage.operation_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Converts a configured duration into a `time::Duration`, saturating on overflow.
pub(crate) fn to_time_duration(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}
