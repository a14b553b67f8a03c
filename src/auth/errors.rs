//! Authentication error types.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie};
use crate::db::StoreError;

/// Outcome of a failed token or credential check.
///
/// The four rejections are caller-visible. `Database` and `Internal` are
/// infrastructure failures and never mean "bad credentials".
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed, bad signature, wrong type, or past `exp`.
    #[error("invalid token")]
    InvalidToken,
    /// Well-formed refresh token with no active record.
    #[error("token revoked")]
    TokenRevoked,
    /// Active record found, but past its stored expiry.
    #[error("token expired")]
    TokenExpired,
    /// Wrong username or password.
    #[error("authentication failed")]
    AuthFailed,
    #[error("database error: {0}")]
    Database(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this is a rejection of the caller's input rather than an
    /// infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken | Self::TokenRevoked | Self::TokenExpired | Self::AuthFailed
        )
    }

    fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        if self.is_rejection() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Client-facing message. Expired and invalid tokens read the same.
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidToken | Self::TokenExpired => "Invalid or expired token",
            Self::TokenRevoked => "Token has been revoked",
            Self::AuthFailed => "Incorrect username or password",
            Self::Database(_) | Self::Internal(_) => "Internal server error",
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "Database error");
        Self::Database(e.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => Self::Internal("refresh token id collision".into()),
            StoreError::Database(e) => e.into(),
        }
    }
}

#[derive(Debug)]
enum ApiAuthErrorKind {
    NotAuthenticated,
    Auth(AuthError),
}

/// API authentication errors (returns JSON and clears cookies).
#[derive(Debug)]
pub struct ApiAuthError {
    kind: ApiAuthErrorKind,
    secure_cookies: bool,
}

impl ApiAuthError {
    pub fn not_authenticated(secure_cookies: bool) -> Self {
        Self {
            kind: ApiAuthErrorKind::NotAuthenticated,
            secure_cookies,
        }
    }

    pub fn new(error: AuthError, secure_cookies: bool) -> Self {
        Self {
            kind: ApiAuthErrorKind::Auth(error),
            secure_cookies,
        }
    }

    fn status_code(&self) -> axum::http::StatusCode {
        match &self.kind {
            ApiAuthErrorKind::NotAuthenticated => axum::http::StatusCode::UNAUTHORIZED,
            ApiAuthErrorKind::Auth(e) => e.status_code(),
        }
    }

    fn message(&self) -> &'static str {
        match &self.kind {
            ApiAuthErrorKind::NotAuthenticated => "Not authenticated",
            ApiAuthErrorKind::Auth(e) => e.message(),
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use axum::http::HeaderValue;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        // Infrastructure failures keep the cookies; the client may retry.
        let rejected = match &self.kind {
            ApiAuthErrorKind::NotAuthenticated => true,
            ApiAuthErrorKind::Auth(e) => e.is_rejection(),
        };
        if rejected {
            let headers = response.headers_mut();
            for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
                if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, self.secure_cookies)) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}
