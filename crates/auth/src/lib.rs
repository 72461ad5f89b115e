//! Accounts and identity for Emberchat.
//!
//! - [`password`] hashes and verifies passwords with Argon2id
//! - [`token`] issues and validates HS256 access tokens
//! - [`AuthService`] ties both to the user store and implements
//!   [`emberchat_core::IdentityProvider`] for the HTTP layer

pub mod password;
pub mod service;
pub mod token;

pub use service::{AccessToken, AuthService, Credentials};
pub use token::{Claims, TokenError, TokenIssuer};
