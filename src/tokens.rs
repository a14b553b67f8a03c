//! Token lifecycle: issuance, rotation and revocation.
//!
//! Combines the JWT codec with the refresh token store. Each refresh token
//! has exactly one row while it is active; rotation removes the old row and
//! inserts the new one in the same transaction, so a refresh token can be
//! exchanged at most once.

use std::sync::Arc;

use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info, warn};

use crate::auth::AuthError;
use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::db::{Database, NewRefreshToken, RefreshTokenRecord, StoreError, TokenStore};
use crate::jti::JtiSource;
use crate::jwt::{AccessTokenResult, JwtCodec, JwtError, RefreshTokenResult};

/// Attempts at inserting a refresh token record before giving up on jti
/// collisions.
const MAX_INSERT_ATTEMPTS: u32 = 2;

/// A freshly issued access/refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: AccessTokenResult,
    pub refresh: RefreshTokenResult,
}

#[derive(Clone)]
pub struct TokenManager {
    db: Database,
    codec: JwtCodec,
    clock: Arc<dyn Clock>,
    jti: Arc<dyn JtiSource>,
}

impl TokenManager {
    pub fn new(
        db: Database,
        config: &TokenConfig,
        clock: Arc<dyn Clock>,
        jti: Arc<dyn JtiSource>,
    ) -> Self {
        Self {
            codec: JwtCodec::new(config, clock.clone()),
            db,
            clock,
            jti,
        }
    }

    pub fn codec(&self) -> &JwtCodec {
        &self.codec
    }

    /// Issue a new token pair for a user.
    ///
    /// The refresh record is committed before either token is returned.
    pub async fn issue(&self, user_id: &str) -> Result<TokenPair, AuthError> {
        let mut tx = self.db.begin().await?;
        let pair = match self.issue_in(&mut tx, user_id).await {
            Ok(pair) => pair,
            Err(e) => return Err(rollback(tx, e).await),
        };
        tx.commit().await?;

        info!(user_id = %user_id, "Issued token pair");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. The old token stops working.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.codec.validate_refresh_token(refresh_token).map_err(|e| {
            debug!(error = %e, "Rejected refresh token");
            AuthError::InvalidToken
        })?;

        let mut tx = self.db.begin().await?;

        let Some(record) = TokenStore::take_by_jti(&mut tx, &claims.jti).await? else {
            tx.rollback().await?;
            warn!(user_id = %claims.sub, "Refresh token is not active");
            return Err(AuthError::TokenRevoked);
        };

        if record.expires_at <= self.now_db() {
            tx.commit().await?;
            info!(record_id = record.id, "Removed expired refresh token record");
            return Err(AuthError::TokenExpired);
        }

        if record.user_id != claims.sub {
            tx.rollback().await?;
            warn!(
                record_id = record.id,
                user_id = %claims.sub,
                "Refresh token subject does not match stored owner"
            );
            return Err(AuthError::InvalidToken);
        }

        // On failure the old record comes back with the rollback.
        let pair = match self.issue_in(&mut tx, &record.user_id).await {
            Ok(pair) => pair,
            Err(e) => return Err(rollback(tx, e).await),
        };
        tx.commit().await?;

        info!(
            user_id = %record.user_id,
            old_record_id = record.id,
            "Rotated refresh token"
        );
        Ok(pair)
    }

    /// Revoke a single refresh token.
    ///
    /// A token that cannot be decoded is treated as already revoked.
    pub async fn revoke_one(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = match self.codec.validate_refresh_token(refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Ignoring undecodable refresh token on revoke");
                return Ok(());
            }
        };

        let mut tx = self.db.begin().await?;
        let removed = TokenStore::delete_by_jti(&mut tx, &claims.jti).await?;
        tx.commit().await?;

        if removed > 0 {
            info!(user_id = %claims.sub, "Revoked refresh token");
        }
        Ok(())
    }

    /// Revoke every refresh token of a user. Returns how many were removed.
    ///
    /// Access tokens already handed out stay valid until they expire.
    pub async fn revoke_all(&self, user_id: &str) -> Result<u64, AuthError> {
        let mut tx = self.db.begin().await?;
        let removed = TokenStore::delete_all_by_user(&mut tx, user_id).await?;
        tx.commit().await?;

        info!(user_id = %user_id, count = removed, "Revoked all refresh tokens");
        Ok(removed)
    }

    /// Check an access token and return its subject. No storage access.
    pub fn verify_access(&self, access_token: &str) -> Result<String, AuthError> {
        self.codec
            .validate_access_token(access_token)
            .map(|claims| claims.sub)
            .map_err(|e| {
                debug!(error = %e, "Rejected access token");
                AuthError::InvalidToken
            })
    }

    /// Active refresh token records of a user, newest first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(TokenStore::list_by_user(&mut conn, user_id, self.clock.now()).await?)
    }

    /// Delete records whose expiry has passed. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(TokenStore::delete_expired(&mut conn, self.clock.now()).await?)
    }

    /// Persist a refresh record and encode both tokens on the caller's
    /// transaction.
    async fn issue_in(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> Result<TokenPair, AuthError> {
        let refresh = self.persist_refresh_token(conn, user_id).await?;
        let access = self
            .codec
            .generate_access_token(user_id)
            .map_err(encoding_failed)?;
        Ok(TokenPair { access, refresh })
    }

    async fn persist_refresh_token(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> Result<RefreshTokenResult, AuthError> {
        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            let jti = self.jti.generate();
            let refresh = self
                .codec
                .generate_refresh_token(user_id, &jti)
                .map_err(encoding_failed)?;

            let record = NewRefreshToken {
                user_id,
                jti: &refresh.jti,
                expires_at: refresh.expires_at,
                created_at: refresh.issued_at,
            };

            match TokenStore::insert(conn, &record).await {
                Ok(id) => {
                    debug!(record_id = id, user_id = %user_id, "Stored refresh token record");
                    return Ok(refresh);
                }
                Err(StoreError::Conflict) => {
                    warn!(attempt, user_id = %user_id, "Refresh token id collision");
                }
                Err(StoreError::Database(e)) => return Err(e.into()),
            }
        }

        Err(AuthError::Internal(
            "could not allocate a unique refresh token id".into(),
        ))
    }

    fn now_db(&self) -> i64 {
        i64::try_from(self.clock.now()).unwrap_or(i64::MAX)
    }
}

/// Roll back before reporting `cause`, so the connection is clean when it
/// returns to the pool.
async fn rollback(tx: Transaction<'_, Sqlite>, cause: AuthError) -> AuthError {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Failed to roll back token transaction");
    }
    cause
}

fn encoding_failed(e: JwtError) -> AuthError {
    AuthError::Internal(e.to_string())
}
