//! Active refresh token storage.
//!
//! Only refresh tokens are stored; access tokens are stateless. A row exists
//! exactly as long as its token may still be rotated, so deleting a row is
//! how a token is revoked.
//!
//! Every method takes a connection rather than the pool so that callers decide
//! the transaction boundary. Nothing here begins or commits.

use sqlx::SqliteConnection;

/// An active refresh token record.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: String,
    pub jti: String,
    /// Unix seconds
    pub expires_at: i64,
    /// Unix seconds
    pub created_at: i64,
}

/// Fields for inserting a new record.
#[derive(Debug, Clone, Copy)]
pub struct NewRefreshToken<'a> {
    pub user_id: &'a str,
    pub jti: &'a str,
    pub expires_at: u64,
    pub created_at: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with the same jti already exists.
    #[error("refresh token jti already exists")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Queries over the `refresh_tokens` table.
pub struct TokenStore;

impl TokenStore {
    /// Insert a new refresh token record and return its id.
    pub async fn insert(
        conn: &mut SqliteConnection,
        token: &NewRefreshToken<'_>,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, jti, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token.user_id)
        .bind(token.jti)
        .bind(to_db_time(token.expires_at))
        .bind(to_db_time(token.created_at))
        .execute(&mut *conn)
        .await;

        match result {
            Ok(result) => Ok(result.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Conflict),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Get a record by its JWT ID.
    pub async fn find_by_jti(
        conn: &mut SqliteConnection,
        jti: &str,
    ) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, user_id, jti, expires_at, created_at FROM refresh_tokens WHERE jti = ?",
        )
        .bind(jti)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Delete a record by its JWT ID and return it, in one statement.
    ///
    /// Two callers racing on the same jti cannot both get `Some`: the delete
    /// takes the write lock, and the loser sees the row already gone.
    pub async fn take_by_jti(
        conn: &mut SqliteConnection,
        jti: &str,
    ) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        sqlx::query_as(
            "DELETE FROM refresh_tokens WHERE jti = ? RETURNING id, user_id, jti, expires_at, created_at",
        )
        .bind(jti)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Delete a record by its JWT ID. Returns 0 if absent, 1 if removed.
    pub async fn delete_by_jti(conn: &mut SqliteConnection, jti: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE jti = ?")
            .bind(jti)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all records for a user (logout everywhere).
    pub async fn delete_all_by_user(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// List unexpired records for a user, newest first.
    pub async fn list_by_user(
        conn: &mut SqliteConnection,
        user_id: &str,
        now: u64,
    ) -> Result<Vec<RefreshTokenRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, user_id, jti, expires_at, created_at FROM refresh_tokens
             WHERE user_id = ? AND expires_at > ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(to_db_time(now))
        .fetch_all(&mut *conn)
        .await
    }

    /// Delete all records whose expiry is at or before `now`.
    pub async fn delete_expired(conn: &mut SqliteConnection, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(to_db_time(now))
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

/// SQLite integers are signed.
fn to_db_time(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
