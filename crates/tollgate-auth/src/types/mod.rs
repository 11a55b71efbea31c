//! Domain types for clients, codes, tokens, and users.

mod client;
mod code;
pub mod scope;
mod token;
mod user;

pub use client::{Client, GrantType};
pub use code::AuthorizationCode;
pub use token::{AccessToken, RefreshToken};
pub use user::User;
