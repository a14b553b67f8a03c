//! Session API endpoints.
//!
//! - POST `/login` - Check credentials, set both cookies
//! - POST `/refresh` - Rotate the refresh token, set both cookies
//! - POST `/logout` - Revoke the refresh token and clear cookies
//! - POST `/logout-all` - Revoke every refresh token of the current user
//! - GET `/sessions` - List active refresh tokens for the current user

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::users::UserResponse;
use crate::auth::{
    ACCESS_COOKIE_NAME, ApiAuthError, Auth, REFRESH_COOKIE_NAME, SessionService, auth_cookie,
    clear_cookie, get_cookie,
};
use crate::impl_has_sessions;
use crate::rate_limit::{RateLimitConfig, rate_limit_login};
use crate::tokens::TokenPair;

#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionService,
    pub secure_cookies: bool,
}

impl_has_sessions!(AuthState);

pub fn router(state: AuthState, rate_limit: Arc<RateLimitConfig>) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_login));

    Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/sessions", get(list_sessions))
        .with_state(state)
        .merge(login_router)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    user: UserResponse,
    access_token: String,
    token_type: &'static str,
}

#[derive(Serialize)]
struct RefreshResponse {
    access_token: String,
    token_type: &'static str,
}

#[derive(Serialize)]
struct LogoutAllResponse {
    user_id: String,
    username: String,
    tokens_revoked: u64,
}

#[derive(Serialize)]
struct SessionInfo {
    id: i64,
    created_at: i64,
    expires_at: i64,
    is_current: bool,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

type CookieHeaders = AppendHeaders<[(HeaderName, String); 2]>;

fn token_cookies(tokens: &TokenPair, secure: bool) -> CookieHeaders {
    AppendHeaders([
        (
            SET_COOKIE,
            auth_cookie(
                ACCESS_COOKIE_NAME,
                &tokens.access.token,
                tokens.access.duration,
                secure,
            ),
        ),
        (
            SET_COOKIE,
            auth_cookie(
                REFRESH_COOKIE_NAME,
                &tokens.refresh.token,
                tokens.refresh.duration,
                secure,
            ),
        ),
    ])
}

fn cleared_cookies(secure: bool) -> CookieHeaders {
    AppendHeaders([
        (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME, secure)),
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME, secure)),
    ])
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .login(payload.username.trim(), &payload.password)
        .await?;

    Ok((
        StatusCode::OK,
        token_cookies(&session.tokens, state.secure_cookies),
        Json(LoginResponse {
            user: UserResponse::from(session.user),
            access_token: session.tokens.access.token,
            token_type: "bearer",
        }),
    ))
}

async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiAuthError> {
    let secure = state.secure_cookies;
    let refresh_token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiAuthError::not_authenticated(secure))?;

    let tokens = state
        .sessions
        .refresh(refresh_token)
        .await
        .map_err(|e| ApiAuthError::new(e, secure))?;

    Ok((
        StatusCode::OK,
        token_cookies(&tokens, secure),
        Json(RefreshResponse {
            access_token: tokens.access.token,
            token_type: "bearer",
        }),
    ))
}

async fn logout(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(refresh_token) = get_cookie(&headers, REFRESH_COOKIE_NAME) {
        state.sessions.logout(refresh_token).await?;
    }

    Ok((
        StatusCode::OK,
        cleared_cookies(state.secure_cookies),
        Json(serde_json::json!({ "success": true })),
    ))
}

async fn logout_all(
    State(state): State<AuthState>,
    Auth(user): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let tokens_revoked = state.sessions.logout_all(&user.id).await?;

    Ok((
        StatusCode::OK,
        cleared_cookies(state.secure_cookies),
        Json(LogoutAllResponse {
            user_id: user.id,
            username: user.username,
            tokens_revoked,
        }),
    ))
}

async fn list_sessions(
    State(state): State<AuthState>,
    Auth(user): Auth,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.sessions.sessions(&user.id).await?;

    // Mark the session the request came from, if it carries a refresh cookie.
    let current_jti = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .and_then(|token| {
            state
                .sessions
                .tokens()
                .codec()
                .validate_refresh_token(token)
                .ok()
        })
        .map(|claims| claims.jti);

    let sessions = records
        .into_iter()
        .map(|record| SessionInfo {
            is_current: current_jti.as_deref() == Some(record.jti.as_str()),
            id: record.id,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
        .collect();

    Ok(Json(ListSessionsResponse { sessions }))
}
