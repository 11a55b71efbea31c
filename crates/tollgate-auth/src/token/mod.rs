//! Token issuance.
//!
//! This module provides:
//!
//! - JWT access token signing and decoding
//! - The grant dispatcher behind the token endpoint
//! - Refresh token rotation

pub mod jwt;
pub mod service;

pub use jwt::{AccessTokenClaims, JwtError, JwtService, SigningAlgorithm, SigningKeyPair};
pub use service::{TokenConfig, TokenService};
