//! CLI argument parsing, validation, and startup helpers.

use std::num::NonZeroU32;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::ServerConfig;
use crate::config::{
    DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, SigningAlgorithm, TokenConfig,
};
use crate::db::{DEFAULT_MAX_CONNECTIONS, Database};
use crate::rate_limit::DEFAULT_LOGIN_PER_MINUTE;

const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokenward",
    about = "Session service with rotating refresh tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "TOKENWARD_PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "TOKENWARD_DATABASE", default_value = "tokenward.db")]
    pub database: String,

    /// Maximum number of pooled database connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    /// Access token lifetime in seconds
    #[arg(long, env = "TOKENWARD_ACCESS_TTL", default_value_t = DEFAULT_ACCESS_TTL_SECS)]
    pub access_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "TOKENWARD_REFRESH_TTL", default_value_t = DEFAULT_REFRESH_TTL_SECS)]
    pub refresh_ttl: u64,

    /// JWT signing algorithm
    #[arg(long, value_enum, default_value_t = SigningAlgorithm::Hs256)]
    pub algorithm: SigningAlgorithm,

    /// Tolerated clock skew in seconds when checking token expiry
    #[arg(long, default_value_t = 0)]
    pub leeway: u64,

    /// Path to file containing the access token secret. Prefer the ACCESS_TOKEN_SECRET env var
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the REFRESH_TOKEN_SECRET env var
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Omit the Secure flag on cookies (local development over plain HTTP)
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Use the first X-Forwarded-For hop as the client IP (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Login attempts allowed per minute per client IP
    #[arg(long, default_value_t = NonZeroU32::new(DEFAULT_LOGIN_PER_MINUTE).unwrap_or(NonZeroU32::MIN))]
    pub login_rate_per_minute: NonZeroU32,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
/// Verbosity comes from `RUST_LOG` and defaults to `info`.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
///
/// Must run before any other threads are started.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<Vec<u8>> {
    if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: Only called from `main` before the tokio runtime is built,
        // so no other thread can be reading the environment.
        unsafe { std::env::remove_var(env_var) };
        return Some(secret.into_bytes());
    }

    let Some(path) = secret_file else {
        error!(
            env_var = %env_var,
            "Secret is required. Set the environment variable (recommended) or use the matching --*-secret-file option"
        );
        return None;
    };

    match std::fs::read_to_string(path) {
        Ok(content) => Some(content.trim().as_bytes().to_vec()),
        Err(e) => {
            error!(path = %path, error = %e, "Failed to read secret file");
            None
        }
    }
}

/// Load both secrets and build a validated token configuration.
pub fn build_token_config(args: &Args) -> Option<TokenConfig> {
    let access_secret = load_secret(ACCESS_SECRET_ENV, args.access_secret_file.as_deref())?;
    let refresh_secret = load_secret(REFRESH_SECRET_ENV, args.refresh_secret_file.as_deref())?;

    let config = TokenConfig::new(access_secret, refresh_secret)
        .with_ttls(args.access_ttl, args.refresh_ttl)
        .with_algorithm(args.algorithm)
        .with_leeway(args.leeway);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid token configuration");
        return None;
    }

    Some(config)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, tokens: TokenConfig) -> ServerConfig {
    let mut config = ServerConfig::new(db, tokens);
    config.secure_cookies = !args.insecure_cookies;
    config.trust_forwarded_for = args.trust_forwarded_for;
    config.login_per_minute = args.login_rate_per_minute;
    config
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str, max_connections: u32) -> Option<Database> {
    match Database::open_with(path, max_connections).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
