//! Scheduled cleanup of expired refresh token records and idle rate limiter
//! entries.

use crate::rate_limit::RateLimitConfig;
use crate::tokens::TokenManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run cleanup once.
pub async fn run_cleanup(tokens: &TokenManager, rate_limit: &RateLimitConfig) {
    match tokens.purge_expired().await {
        Ok(count) if count > 0 => info!(count, "Cleaned up expired refresh tokens"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to clean up expired refresh tokens"),
    }
    rate_limit.prune();
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    tokens: TokenManager,
    rate_limit: Arc<RateLimitConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&tokens, &rate_limit).await;
        }
    })
}
