use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ResultExt};
use crate::auth::{Auth, SessionService};
use crate::db::{User, UserStore};
use crate::impl_has_sessions;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 32;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct UsersState {
    pub sessions: SessionService,
    pub users: UserStore,
    pub secure_cookies: bool,
}

impl_has_sessions!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/me", get(current_user))
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    email: String,
    password: String,
}

/// Public view of a user. Never includes the password hash.
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Deserialize)]
struct ListUsersQuery {
    page: Option<i64>,
    size: Option<i64>,
}

#[derive(Serialize)]
struct UsersPage {
    items: Vec<UserResponse>,
    total: i64,
    page: i64,
    size: i64,
    pages: i64,
}

/// Number of pages needed for `total` items.
fn page_count(total: i64, size: i64) -> i64 {
    (total + size - 1) / size
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.len() < MIN_USERNAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_LENGTH
        )));
    }

    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Username cannot be longer than {} characters",
            MAX_USERNAME_LENGTH
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid || email.len() > 254 {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password cannot be longer than {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

async fn create_user(
    State(state): State<UsersState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();
    let email = payload.email.trim();

    validate_username(username)?;
    validate_email(email)?;
    validate_password(&payload.password)?;

    let taken = state
        .users
        .is_taken(username, email)
        .await
        .db_err("Failed to check username availability")?;

    if taken {
        return Err(ApiError::conflict("Username or email is already registered"));
    }

    let password_hash = state.sessions.hash_password(&payload.password).await?;
    let id = uuid::Uuid::new_v4().to_string();

    match state.users.create(&id, username, email, &password_hash).await {
        Ok(()) => {}
        // Lost a race with a concurrent registration.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(ApiError::conflict("Username or email is already registered"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    }

    let user = state
        .users
        .get_by_id(&id)
        .await
        .db_err("Failed to load created user")?
        .ok_or_else(|| ApiError::internal("Created user not found"))?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Registered users, one page at a time. Requires authentication.
async fn list_users(
    Auth(_): Auth,
    State(state): State<UsersState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1);
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 {
        return Err(ApiError::bad_request("Page must be at least 1"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&size) {
        return Err(ApiError::bad_request(format!(
            "Page size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let offset = (page - 1)
        .checked_mul(size)
        .ok_or_else(|| ApiError::bad_request("Page is out of range"))?;

    let total = state.users.count().await.db_err("Failed to count users")?;
    let items = state
        .users
        .list(offset, size)
        .await
        .db_err("Failed to list users")?;

    Ok(Json(UsersPage {
        items: items.into_iter().map(UserResponse::from).collect(),
        total,
        page,
        size,
        pages: page_count(total, size),
    }))
}

async fn current_user(Auth(user): Auth) -> impl IntoResponse {
    Json(UserResponse::from(user))
}
