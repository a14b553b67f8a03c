pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod jti;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod tokens;

use api::create_api_router;
use auth::SessionService;
use axum::Router;
use clock::{Clock, SystemClock};
use config::TokenConfig;
use db::Database;
use jti::{JtiSource, OsJtiSource};
use password::{Argon2Hasher, PasswordHasher};
use rate_limit::{DEFAULT_LOGIN_PER_MINUTE, RateLimitConfig};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokens::TokenManager;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Token lifetimes, secrets and algorithm
    pub tokens: TokenConfig,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Key the login rate limiter on X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
    /// Login attempts per minute per client IP
    pub login_per_minute: NonZeroU32,
    pub clock: Arc<dyn Clock>,
    pub jti: Arc<dyn JtiSource>,
    pub hasher: Arc<dyn PasswordHasher>,
}

impl ServerConfig {
    /// Production defaults: system clock, OS randomness, Argon2id, secure cookies.
    pub fn new(db: Database, tokens: TokenConfig) -> Self {
        Self {
            db,
            tokens,
            secure_cookies: true,
            trust_forwarded_for: false,
            login_per_minute: NonZeroU32::new(DEFAULT_LOGIN_PER_MINUTE)
                .unwrap_or(NonZeroU32::MIN),
            clock: Arc::new(SystemClock),
            jti: Arc::new(OsJtiSource),
            hasher: Arc::new(Argon2Hasher::new()),
        }
    }
}

/// Wire the token manager and session service for a configuration.
pub fn session_service(config: &ServerConfig) -> SessionService {
    let tokens = TokenManager::new(
        config.db.clone(),
        &config.tokens,
        config.clock.clone(),
        config.jti.clone(),
    );
    SessionService::new(
        tokens,
        Arc::new(config.db.users()),
        config.hasher.clone(),
    )
}

/// Login rate limiter for a configuration.
pub fn login_rate_limit(config: &ServerConfig) -> Arc<RateLimitConfig> {
    Arc::new(RateLimitConfig::new(
        config.login_per_minute,
        config.trust_forwarded_for,
    ))
}

/// Create the application router around an existing session service.
pub fn create_router(config: &ServerConfig, sessions: SessionService) -> Router {
    create_router_with(config, sessions, login_rate_limit(config))
}

/// Create the application router with a shared login rate limiter.
pub fn create_router_with(
    config: &ServerConfig,
    sessions: SessionService,
    rate_limit: Arc<RateLimitConfig>,
) -> Router {
    let api_router = create_api_router(
        sessions,
        config.db.users(),
        config.secure_cookies,
        rate_limit,
    );

    Router::new().nest("/api", api_router)
}

/// Run cleanup once and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(tokens: &TokenManager, rate_limit: Arc<RateLimitConfig>) {
    cleanup::run_cleanup(tokens, &rate_limit).await;
    cleanup::spawn_cleanup_scheduler(tokens.clone(), rate_limit);
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let sessions = session_service(&config);
    let rate_limit = login_rate_limit(&config);
    init_cleanup(sessions.tokens(), rate_limit.clone()).await;

    let app = create_router_with(&config, sessions, rate_limit);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
