use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use tollgate_auth::config::AuthConfig;
use tollgate_auth::types::GrantType;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Grant processing configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Clients registered at startup
    #[serde(default)]
    pub clients: Vec<ClientSeed>,
    /// Resource owners registered at startup
    #[serde(default)]
    pub users: Vec<UserSeed>,
    /// Assertion issuers trusted at startup
    #[serde(default)]
    pub trusted_issuers: Vec<TrustedIssuerSeed>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if self.server.cleanup_interval_secs == 0 {
            return Err("server.cleanup_interval_secs must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Auth validation
        self.auth.validate().map_err(|e| format!("auth: {e}"))?;
        // Seed validations
        let mut client_ids = HashSet::new();
        for client in &self.clients {
            if client.client_id.is_empty() {
                return Err("clients[].client_id must not be empty".into());
            }
            if !client_ids.insert(client.client_id.as_str()) {
                return Err(format!("duplicate client_id '{}'", client.client_id));
            }
            if client.secret.is_some() && client.secret_hash.is_some() {
                return Err(format!(
                    "client '{}' sets both secret and secret_hash",
                    client.client_id
                ));
            }
        }
        for user in &self.users {
            if user.password.is_some() == user.password_hash.is_some() {
                return Err(format!(
                    "user '{}' must set exactly one of password or password_hash",
                    user.username
                ));
            }
        }
        for issuer in &self.trusted_issuers {
            if issuer.public_key_pem.is_some() == issuer.public_key_path.is_some() {
                return Err(format!(
                    "trusted issuer '{}' must set exactly one of public_key_pem or public_key_path",
                    issuer.issuer
                ));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::new(host, self.server.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Interval between sweeps of expired codes, tokens and replay entries.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}
fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A client registration loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSeed {
    pub client_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Plaintext secret, hashed at startup.
    #[serde(default)]
    pub secret: Option<String>,
    /// Pre-hashed Argon2 secret.
    #[serde(default)]
    pub secret_hash: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub audiences: Vec<String>,
    /// Allowed grants; every grant when unset.
    #[serde(default)]
    pub grant_types: Option<Vec<GrantType>>,
}

/// A resource owner loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub username: String,
    /// Plaintext password, hashed at startup.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// A trusted assertion issuer loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedIssuerSeed {
    pub issuer: String,
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default)]
    pub public_key_path: Option<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "tollgate.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., TOLLGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("TOLLGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}
