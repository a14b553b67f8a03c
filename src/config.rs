//! Token configuration, built once at startup and handed to the codec.

use jsonwebtoken::Algorithm;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;

/// Default refresh token lifetime: 30 days.
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Longest accepted token lifetime: 10 years.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Minimum accepted length for each signing secret.
pub const MIN_SECRET_LENGTH: usize = 32;

/// HMAC algorithm used to sign both token types.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SigningAlgorithm {
    #[default]
    Hs256,
    Hs384,
    Hs512,
}

impl From<SigningAlgorithm> for Algorithm {
    fn from(alg: SigningAlgorithm) -> Self {
        match alg {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Hs384 => Algorithm::HS384,
            SigningAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub algorithm: SigningAlgorithm,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Tolerated clock skew when checking `exp`.
    pub leeway_secs: u64,
}

impl TokenConfig {
    /// Config with default lifetimes and HS256.
    pub fn new(access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            algorithm: SigningAlgorithm::default(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            leeway_secs: 0,
        }
    }

    pub fn with_ttls(mut self, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        self.access_ttl_secs = access_ttl_secs;
        self.refresh_ttl_secs = refresh_ttl_secs;
        self
    }

    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Check secret lengths, key separation and TTL sanity.
    pub fn validate(&self) -> Result<(), String> {
        if self.access_secret.len() < MIN_SECRET_LENGTH {
            return Err(format!(
                "access token secret is shorter than {} bytes",
                MIN_SECRET_LENGTH
            ));
        }
        if self.refresh_secret.len() < MIN_SECRET_LENGTH {
            return Err(format!(
                "refresh token secret is shorter than {} bytes",
                MIN_SECRET_LENGTH
            ));
        }
        if self.access_secret == self.refresh_secret {
            return Err("access and refresh token secrets must differ".to_string());
        }
        if self.access_ttl_secs == 0 || self.refresh_ttl_secs == 0 {
            return Err("token lifetimes must be non-zero".to_string());
        }
        if self.refresh_ttl_secs > MAX_TTL_SECS {
            return Err(format!(
                "token lifetimes cannot exceed {} seconds",
                MAX_TTL_SECS
            ));
        }
        if self.access_ttl_secs >= self.refresh_ttl_secs {
            return Err("access token lifetime must be shorter than refresh token lifetime".into());
        }
        Ok(())
    }
}

// Secrets stay out of debug output.
impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS: &str = "access-secret-at-least-32-bytes-long!!";
    const REFRESH: &str = "refresh-secret-at-least-32-bytes-long!";

    #[test]
    fn test_valid_config() {
        assert!(TokenConfig::new(ACCESS, REFRESH).validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TokenConfig::new("short", REFRESH).validate().is_err());
        assert!(TokenConfig::new(ACCESS, "short").validate().is_err());
    }

    #[test]
    fn test_shared_secret_rejected() {
        let err = TokenConfig::new(ACCESS, ACCESS).validate().unwrap_err();
        assert!(err.contains("must differ"));
    }

    #[test]
    fn test_access_ttl_must_be_shorter() {
        let config = TokenConfig::new(ACCESS, REFRESH).with_ttls(3600, 60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_ttl_rejected() {
        let config = TokenConfig::new(ACCESS, REFRESH).with_ttls(60, u64::MAX);
        assert!(config.validate().unwrap_err().contains("cannot exceed"));

        let config = TokenConfig::new(ACCESS, REFRESH).with_ttls(60, MAX_TTL_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let debug = format!("{:?}", TokenConfig::new(ACCESS, REFRESH));
        assert!(!debug.contains(ACCESS));
        assert!(!debug.contains(REFRESH));
    }
}
