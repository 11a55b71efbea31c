//! Resource owner type.

use serde::{Deserialize, Serialize};

/// A resource owner who can approve authorization requests and use the
/// password grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Login name, also used as the token subject.
    pub username: String,

    /// Argon2 hash of the password.
    pub password_hash: String,

    /// Inactive users cannot authenticate.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    /// Creates an active user from an already hashed password.
    #[must_use]
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            active: true,
        }
    }
}
