//! Session operations exposed to the HTTP layer.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{info, warn};

use super::errors::AuthError;
use crate::db::{RefreshTokenRecord, User};
use crate::password::{PasswordError, PasswordHasher};
use crate::tokens::{TokenManager, TokenPair};

/// Hashed once and verified against for unknown usernames, so those logins
/// cost the same as a wrong password.
const DUMMY_PASSWORD: &str = "tokenward-dummy-password";

/// Looks up users for authentication.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AuthError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError>;
}

/// A successful login.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct SessionService {
    tokens: TokenManager,
    users: Arc<dyn UserDirectory>,
    hasher: Arc<dyn PasswordHasher>,
    dummy_hash: Arc<OnceLock<String>>,
}

impl SessionService {
    pub fn new(
        tokens: TokenManager,
        users: Arc<dyn UserDirectory>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            tokens,
            users,
            hasher,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Check credentials and issue a token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            self.verify_dummy(password).await?;
            info!(username = %username, "Login failed: unknown user");
            return Err(AuthError::AuthFailed);
        };

        if !self.verify_password(password, &user.password_hash).await? {
            info!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::AuthFailed);
        }

        let tokens = self.tokens.issue(&user.id).await?;
        info!(user_id = %user.id, "User logged in");
        Ok(Session { user, tokens })
    }

    /// Exchange a refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.tokens.rotate(refresh_token).await
    }

    /// Revoke a refresh token. Garbage tokens succeed silently.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.tokens.revoke_one(refresh_token).await
    }

    /// Revoke every refresh token of a user.
    pub async fn logout_all(&self, user_id: &str) -> Result<u64, AuthError> {
        self.tokens.revoke_all(user_id).await
    }

    /// Resolve an access token to its user.
    pub async fn require_auth(&self, access_token: &str) -> Result<User, AuthError> {
        let subject = self.tokens.verify_access(access_token)?;
        match self.users.find_by_id(&subject).await? {
            Some(user) => Ok(user),
            None => {
                warn!(user_id = %subject, "Access token for unknown user");
                Err(AuthError::InvalidToken)
            }
        }
    }

    /// Active refresh tokens of a user, newest first.
    pub async fn sessions(&self, user_id: &str) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        self.tokens.list_sessions(user_id).await
    }

    /// Hash a password on the blocking pool.
    pub async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    async fn verify_dummy(&self, password: &str) -> Result<(), AuthError> {
        let hasher = self.hasher.clone();
        let dummy_hash = self.dummy_hash.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), PasswordError> {
            let hash = match dummy_hash.get() {
                Some(hash) => hash,
                None => {
                    let hash = hasher.hash(DUMMY_PASSWORD)?;
                    dummy_hash.get_or_init(|| hash)
                }
            };
            hasher.verify(&password, hash).map(|_| ())
        })
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .map_err(|e| AuthError::Internal(e.to_string()))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TokenConfig;
    use crate::db::Database;
    use crate::jti::OsJtiSource;
    use crate::password::Argon2Hasher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHasher {
        inner: Argon2Hasher,
        hashes: AtomicUsize,
        verifies: AtomicUsize,
    }

    impl PasswordHasher for CountingHasher {
        fn hash(&self, password: &str) -> Result<String, PasswordError> {
            self.hashes.fetch_add(1, Ordering::SeqCst);
            self.inner.hash(password)
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(password, hash)
        }
    }

    async fn service(hasher: Arc<CountingHasher>) -> SessionService {
        let db = Database::open(":memory:").await.unwrap();
        let config = TokenConfig::new(
            "access-secret-that-is-at-least-32-bytes",
            "refresh-secret-that-is-at-least-32-bytes",
        );
        let tokens = TokenManager::new(
            db.clone(),
            &config,
            Arc::new(ManualClock::new(1_000_000)),
            Arc::new(OsJtiSource),
        );
        SessionService::new(tokens, Arc::new(db.users()), hasher)
    }

    #[tokio::test]
    async fn test_unknown_user_still_verifies_a_password() {
        let hasher = Arc::new(CountingHasher {
            inner: Argon2Hasher::with_params(8, 1, 1).unwrap(),
            ..Default::default()
        });
        let sessions = service(hasher.clone()).await;

        for _ in 0..2 {
            let result = sessions.login("nobody", "some-password").await;
            assert!(matches!(result, Err(AuthError::AuthFailed)));
        }

        assert_eq!(hasher.verifies.load(Ordering::SeqCst), 2);
        // The dummy hash is computed once.
        assert_eq!(hasher.hashes.load(Ordering::SeqCst), 1);
    }
}
