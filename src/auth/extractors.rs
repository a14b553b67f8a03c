//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::cookie::{ACCESS_COOKIE_NAME, get_bearer_token, get_cookie};
use super::errors::ApiAuthError;
use super::state::HasSessions;
use crate::db::User;

/// Access token from the `Authorization` header, falling back to the cookie.
pub fn access_token(parts: &Parts) -> Option<&str> {
    get_bearer_token(&parts.headers).or_else(|| get_cookie(&parts.headers, ACCESS_COOKIE_NAME))
}

/// Extractor for endpoints that require a valid access token.
///
/// Access tokens are stateless; an expired one is rejected and the client is
/// expected to call the refresh endpoint.
pub struct Auth(pub User);

impl<S> FromRequestParts<S> for Auth
where
    S: HasSessions + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let secure = state.secure_cookies();
        let token =
            access_token(parts).ok_or_else(|| ApiAuthError::not_authenticated(secure))?;

        state
            .sessions()
            .require_auth(token)
            .await
            .map(Auth)
            .map_err(|e| ApiAuthError::new(e, secure))
    }
}
