//! Registration, login, and token resolution against the user store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use emberchat_config::AuthConfig;
use emberchat_core::store::{ProfileStore, UserStore};
use emberchat_core::{Error, IdentityProvider, Result, StoreError, User, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::password::{hash_password_off_thread, verify_password_off_thread};
use crate::token::{TokenError, TokenIssuer};

const MIN_PASSWORD_CHARS: usize = 8;
const BAD_CREDENTIALS: &str = "Incorrect email or password";

/// Email + password, as posted to register and login.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The login response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    profiles: Arc<dyn ProfileStore>,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        profiles: Arc<dyn ProfileStore>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            users,
            profiles,
            tokens,
        }
    }

    pub fn from_config(
        config: &AuthConfig,
        users: Arc<dyn UserStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let ttl = Duration::minutes(config.access_token_expire_minutes);
        Self::new(users, profiles, TokenIssuer::new(&config.secret_key, ttl))
    }

    /// Create an account and its empty profile.
    pub async fn register(&self, credentials: &Credentials) -> Result<User> {
        let email = normalize_email(&credentials.email)?;
        if credentials.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(Error::validation(format!(
                "password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }

        let hash = hash_password_off_thread(&credentials.password).await?;
        let user = self
            .users
            .create_user(&email, &hash)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => Error::Conflict("Email already registered".into()),
                other => Error::Store(other),
            })?;
        self.profiles.create_profile(user.id).await?;

        info!(user_id = %user.id, "Registered user");
        Ok(user)
    }

    /// Exchange credentials for an access token.
    pub async fn login(&self, credentials: &Credentials) -> Result<AccessToken> {
        let email = credentials.email.trim().to_lowercase();
        let user = self
            .users
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| Error::Unauthenticated(BAD_CREDENTIALS.into()))?;
        if !verify_password_off_thread(&credentials.password, &user.password_hash).await? {
            return Err(Error::Unauthenticated(BAD_CREDENTIALS.into()));
        }

        if !user.is_active {
            return Err(Error::Forbidden("Inactive user".into()));
        }

        let access_token = self
            .tokens
            .issue(user.id)
            .map_err(|e| Error::Internal(e.to_string()))?;
        debug!(user_id = %user.id, "Issued access token");

        Ok(AccessToken {
            access_token,
            token_type: "bearer".into(),
            expires_in: self.tokens.ttl().num_seconds(),
        })
    }

    /// The account behind an authenticated request.
    pub async fn current_user(&self, user_id: UserId) -> Result<User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {user_id}")))
    }
}

#[async_trait]
impl IdentityProvider for AuthService {
    async fn resolve(&self, token: &str) -> Result<UserId> {
        let user_id = self.tokens.validate(token).map_err(|e| match e {
            TokenError::Expired => Error::Unauthenticated("Token expired".into()),
            _ => Error::Unauthenticated("Could not validate credentials".into()),
        })?;

        match self.users.get_user(user_id).await? {
            Some(user) if user.is_active => Ok(user.id),
            Some(_) => Err(Error::Forbidden("Inactive user".into())),
            None => Err(Error::Unauthenticated(
                "Could not validate credentials".into(),
            )),
        }
    }
}

fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(Error::validation(format!("invalid email address: {raw}")));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberchat_store::InMemoryStore;

    fn service() -> (AuthService, InMemoryStore) {
        let store = InMemoryStore::new();
        let svc = AuthService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            TokenIssuer::new("test-secret", Duration::minutes(60)),
        );
        (svc, store)
    }

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_creates_user_and_empty_profile() {
        let (svc, store) = service();
        let user = svc
            .register(&creds("  Ada@Example.com ", "correct-horse"))
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");

        let profile = store.get_profile(user.id).await.unwrap().unwrap();
        assert!(profile.is_empty());
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_input() {
        let (svc, _) = service();
        svc.register(&creds("ada@example.com", "correct-horse"))
            .await
            .unwrap();

        let dup = svc
            .register(&creds("ADA@example.com", "correct-horse"))
            .await
            .unwrap_err();
        assert!(matches!(dup, Error::Conflict(_)));

        let short = svc.register(&creds("bob@example.com", "short")).await;
        assert!(matches!(short, Err(Error::Validation(_))));

        let bad_email = svc.register(&creds("bob-at-example", "long-enough")).await;
        assert!(matches!(bad_email, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn login_then_resolve() {
        let (svc, _) = service();
        let user = svc
            .register(&creds("ada@example.com", "correct-horse"))
            .await
            .unwrap();

        let token = svc
            .login(&creds("ada@example.com", "correct-horse"))
            .await
            .unwrap();
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.expires_in, 3600);

        let resolved = svc.resolve(&token.access_token).await.unwrap();
        assert_eq!(resolved, user.id);
        assert_eq!(svc.current_user(resolved).await.unwrap().email, "ada@example.com");
    }

    #[tokio::test]
    async fn wrong_email_and_wrong_password_look_the_same() {
        let (svc, _) = service();
        svc.register(&creds("ada@example.com", "correct-horse"))
            .await
            .unwrap();

        let wrong_pw = svc
            .login(&creds("ada@example.com", "wrong-horse"))
            .await
            .unwrap_err();
        let wrong_email = svc
            .login(&creds("nobody@example.com", "correct-horse"))
            .await
            .unwrap_err();
        assert!(matches!(wrong_pw, Error::Unauthenticated(_)));
        assert_eq!(wrong_pw.to_string(), wrong_email.to_string());
    }

    #[tokio::test]
    async fn token_for_deleted_user_is_rejected() {
        let (svc, _) = service();
        let issuer = TokenIssuer::new("test-secret", Duration::minutes(60));
        let token = issuer.issue(UserId(999)).unwrap();
        let err = svc.resolve(&token).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)));
    }

    #[test]
    fn email_shapes() {
        assert!(normalize_email("a@b.co").is_ok());
        assert!(normalize_email("@b.co").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("a@@b.co").is_err());
        assert!(normalize_email("a b@c.co").is_err());
    }
}
