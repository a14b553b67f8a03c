#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Response, header};
use tokenward::auth::SessionService;
use tokenward::clock::ManualClock;
use tokenward::config::TokenConfig;
use tokenward::db::{Database, User};
use tokenward::jti::{JtiSource, OsJtiSource};
use tokenward::password::{Argon2Hasher, PasswordHasher};
use tokenward::{ServerConfig, create_router, session_service};

pub const ACCESS_SECRET: &str = "test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &str = "test-refresh-secret-0123456789abcdef";

pub const ACCESS_TTL: u64 = 900;
pub const REFRESH_TTL: u64 = 7 * 24 * 60 * 60;

/// Start of every test clock.
pub const START: u64 = 1_700_000_000;

pub const PASSWORD: &str = "correct-horse-battery";

/// Yields queued jtis first, then random ones.
#[derive(Default)]
pub struct SequenceJtiSource {
    queued: Mutex<VecDeque<String>>,
}

impl SequenceJtiSource {
    pub fn new(values: &[&str]) -> Self {
        Self {
            queued: Mutex::new(values.iter().map(|v| v.to_string()).collect()),
        }
    }
}

impl JtiSource for SequenceJtiSource {
    fn generate(&self) -> String {
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| OsJtiSource.generate())
    }
}

/// Argon2 with minimal cost so tests stay fast.
pub fn fast_hasher() -> Arc<Argon2Hasher> {
    Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap())
}

pub struct TestEnv {
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub sessions: SessionService,
    pub config: ServerConfig,
    db_path: Option<PathBuf>,
}

impl TestEnv {
    /// Router over the same session service the test drives directly.
    pub fn app(&self) -> Router {
        create_router(&self.config, self.sessions.clone())
    }

    /// Create a user with the shared test password.
    pub async fn create_user(&self, id: &str, username: &str) -> User {
        let hash = self.config.hasher.hash(PASSWORD).unwrap();
        self.db
            .users()
            .create(id, username, &format!("{}@example.com", username), &hash)
            .await
            .unwrap();
        self.db.users().get_by_id(id).await.unwrap().unwrap()
    }

    /// Number of stored refresh token records.
    pub async fn record_count(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens")
            .fetch_one(self.db.pool())
            .await
            .unwrap();
        count
    }

    pub async fn record_count_for(&self, user_id: &str) -> i64 {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.db.pool())
                .await
                .unwrap();
        count
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        if let Some(path) = &self.db_path {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
            }
        }
    }
}

pub async fn setup() -> TestEnv {
    TestSetup::new().build().await
}

/// Builder for test setup with various options
pub struct TestSetup {
    jti: Arc<dyn JtiSource>,
    file_db: bool,
    secure_cookies: bool,
    login_per_minute: u32,
}

impl TestSetup {
    pub fn new() -> Self {
        Self {
            jti: Arc::new(OsJtiSource),
            file_db: false,
            secure_cookies: false,
            login_per_minute: 1000,
        }
    }

    pub fn with_jti(mut self, jti: Arc<dyn JtiSource>) -> Self {
        self.jti = jti;
        self
    }

    /// Use a temporary file database instead of shared in-memory SQLite.
    pub fn with_file_db(mut self) -> Self {
        self.file_db = true;
        self
    }

    pub fn with_secure_cookies(mut self) -> Self {
        self.secure_cookies = true;
        self
    }

    pub fn with_login_rate(mut self, per_minute: u32) -> Self {
        self.login_per_minute = per_minute;
        self
    }

    pub async fn build(self) -> TestEnv {
        let db_path = self.file_db.then(|| {
            std::env::temp_dir().join(format!("tokenward-test-{}.db", uuid::Uuid::new_v4()))
        });

        let db = match &db_path {
            Some(path) => Database::open_with(path.to_str().unwrap(), 16).await.unwrap(),
            None => Database::open(":memory:").await.unwrap(),
        };

        let clock = Arc::new(ManualClock::new(START));
        let tokens =
            TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET).with_ttls(ACCESS_TTL, REFRESH_TTL);

        let mut config = ServerConfig::new(db.clone(), tokens);
        config.secure_cookies = self.secure_cookies;
        config.login_per_minute = std::num::NonZeroU32::new(self.login_per_minute).unwrap();
        config.clock = clock.clone();
        config.jti = self.jti;
        config.hasher = fast_hasher();

        let sessions = session_service(&config);

        TestEnv {
            db,
            clock,
            sessions,
            config,
            db_path,
        }
    }
}

/// All Set-Cookie header values of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

/// Value of a named cookie among Set-Cookie headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies.iter().find_map(|c| {
        c.strip_prefix(&prefix)
            .and_then(|rest| rest.split(';').next())
            .map(str::to_string)
    })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
