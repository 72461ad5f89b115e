//! Identity resolution: turning a bearer token into a user.

use async_trait::async_trait;

use crate::error::Result;
use crate::user::UserId;

/// Resolves an opaque bearer token to the user it was issued for.
///
/// Fails with [`crate::Error::Unauthenticated`] for missing, malformed,
/// expired or revoked tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<UserId>;
}
