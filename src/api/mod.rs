mod auth;
mod error;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::auth::SessionService;
use crate::db::UserStore;
use crate::rate_limit::RateLimitConfig;

pub use error::ApiError;
pub use users::UserResponse;

/// Create the API router.
pub fn create_api_router(
    sessions: SessionService,
    users: UserStore,
    secure_cookies: bool,
    rate_limit: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        sessions: sessions.clone(),
        secure_cookies,
    };

    let users_state = users::UsersState {
        sessions,
        users,
        secure_cookies,
    };

    Router::new()
        .nest("/users", users::router(users_state))
        .nest("/auth", auth::router(auth_state, rate_limit))
}
