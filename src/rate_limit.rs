//! Rate limiting for the login endpoint.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::{debug, warn};

use crate::auth::extract_client_ip;

/// Default login attempts per minute per IP.
pub const DEFAULT_LOGIN_PER_MINUTE: u32 = 10;

/// Key used when no client IP can be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

#[derive(Clone)]
pub struct RateLimitConfig {
    pub login: Arc<IpLimiter>,
    /// Key on the first `X-Forwarded-For` hop (only behind a trusted proxy)
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// `login_per_minute` is both the refill rate and the burst size.
    pub fn new(login_per_minute: NonZeroU32, trust_forwarded_for: bool) -> Self {
        Self::with_quota(Quota::per_minute(login_per_minute), trust_forwarded_for)
    }

    pub fn with_quota(quota: Quota, trust_forwarded_for: bool) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(quota)),
            trust_forwarded_for,
        }
    }

    /// Forget clients whose bucket has refilled completely.
    pub fn prune(&self) {
        let before = self.login.len();
        self.login.retain_recent();
        self.login.shrink_to_fit();
        debug!(
            before,
            after = self.login.len(),
            "Pruned login rate limiter"
        );
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(
            NonZeroU32::new(DEFAULT_LOGIN_PER_MINUTE).unwrap_or(NonZeroU32::MIN),
            false,
        )
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(
        request.headers(),
        request.extensions(),
        config.trust_forwarded_for,
    )
    .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(client_ip = %ip, "Login rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}
