//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate keys so that a leak of
//! one key cannot be used to forge the other token type.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::TokenConfig;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token - stateless, no JTI
    Access,
    /// Long-lived refresh token - tracked in database with JTI
    Refresh,
}

/// JWT claims for access tokens (stateless, no JTI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens (tracked with JTI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID (unique identifier for revocation tracking)
    pub jti: String,
    /// Subject (user id)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Claims that carry a type tag and an expiry.
pub trait TokenClaims: DeserializeOwned {
    /// The type tag these claims must carry.
    const TYPE: TokenType;

    fn token_type(&self) -> TokenType;
    fn expires_at(&self) -> u64;
}

impl TokenClaims for AccessClaims {
    const TYPE: TokenType = TokenType::Access;

    fn token_type(&self) -> TokenType {
        self.token_type
    }

    fn expires_at(&self) -> u64 {
        self.exp
    }
}

impl TokenClaims for RefreshClaims {
    const TYPE: TokenType = TokenType::Refresh;

    fn token_type(&self) -> TokenType {
        self.token_type
    }

    fn expires_at(&self) -> u64 {
        self.exp
    }
}

/// Result of generating an access token (no JTI).
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token (with JTI for tracking).
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// JWT ID (unique identifier for database tracking)
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Signs and verifies access and refresh tokens.
#[derive(Clone)]
pub struct JwtCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    algorithm: Algorithm,
    access_ttl: u64,
    refresh_ttl: u64,
    leeway: u64,
    clock: Arc<dyn Clock>,
}

impl JwtCodec {
    /// Create a codec from the token configuration.
    pub fn new(config: &TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(&config.access_secret),
            access_decoding: DecodingKey::from_secret(&config.access_secret),
            refresh_encoding: EncodingKey::from_secret(&config.refresh_secret),
            refresh_decoding: DecodingKey::from_secret(&config.refresh_secret),
            algorithm: config.algorithm.into(),
            access_ttl: config.access_ttl_secs,
            refresh_ttl: config.refresh_ttl_secs,
            leeway: config.leeway_secs,
            clock,
        }
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(&self, subject: &str) -> Result<AccessTokenResult, JwtError> {
        let now = self.clock.now();
        let exp = expiry(now, self.access_ttl)?;

        let claims = AccessClaims {
            sub: subject.to_string(),
            token_type: TokenType::Access,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(
            &Header::new(self.algorithm),
            &claims,
            &self.access_encoding,
        )
        .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            expires_at: exp,
            duration: self.access_ttl,
        })
    }

    /// Generate a refresh token for a user, embedding the given JTI.
    pub fn generate_refresh_token(
        &self,
        subject: &str,
        jti: &str,
    ) -> Result<RefreshTokenResult, JwtError> {
        let now = self.clock.now();
        let exp = expiry(now, self.refresh_ttl)?;

        let claims = RefreshClaims {
            jti: jti.to_string(),
            sub: subject.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(
            &Header::new(self.algorithm),
            &claims,
            &self.refresh_encoding,
        )
        .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            jti: jti.to_string(),
            issued_at: now,
            expires_at: exp,
            duration: self.refresh_ttl,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        self.decode(token)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        self.decode(token)
    }

    /// Verify signature with the key for `C::TYPE`, then the type tag, then expiry.
    pub fn decode<C: TokenClaims>(&self, token: &str) -> Result<C, JwtError> {
        let key = match C::TYPE {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };

        // Expiry is checked below against the injected clock.
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<C>(token, key, &validation)
            .map_err(JwtError::Decoding)?
            .claims;

        if claims.token_type() != C::TYPE {
            return Err(JwtError::WrongTokenType);
        }

        if claims.expires_at().saturating_add(self.leeway) <= self.clock.now() {
            return Err(JwtError::Expired);
        }

        Ok(claims)
    }
}

/// `now + ttl`, kept within the range the token store can hold.
fn expiry(now: u64, ttl: u64) -> Result<u64, JwtError> {
    now.checked_add(ttl)
        .filter(|exp| i64::try_from(*exp).is_ok())
        .ok_or(JwtError::ExpiryOutOfRange)
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Error encoding the token
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature, malformed token or missing claims
    #[error("failed to decode token: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    /// Token is past its `exp`
    #[error("token expired")]
    Expired,
    /// `iat + ttl` does not fit a timestamp
    #[error("token expiry out of range")]
    ExpiryOutOfRange,
    /// Wrong token type (e.g., using refresh token as access token)
    #[error("wrong token type")]
    WrongTokenType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SigningAlgorithm;

    const ACCESS_SECRET: &[u8] = b"test-access-secret-for-testing-only";
    const REFRESH_SECRET: &[u8] = b"test-refresh-secret-for-testing-only";

    fn codec_with_clock(clock: Arc<ManualClock>) -> JwtCodec {
        let config = TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET).with_ttls(300, 3600);
        JwtCodec::new(&config, clock)
    }

    fn codec() -> JwtCodec {
        codec_with_clock(Arc::new(ManualClock::starting_now()))
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let codec = codec();

        let result = codec.generate_access_token("uuid-123").unwrap();
        assert_eq!(result.duration, 300);

        let claims = codec.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp, result.expires_at);
    }

    #[test]
    fn test_generate_and_validate_refresh_token() {
        let codec = codec();

        let result = codec.generate_refresh_token("uuid-123", "jti-abc").unwrap();
        assert_eq!(result.duration, 3600);
        assert_eq!(result.expires_at, result.issued_at + 3600);

        let claims = codec.validate_refresh_token(&result.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.jti, "jti-abc");
    }

    #[test]
    fn test_wrong_token_type_rejected() {
        let codec = codec();

        let access = codec.generate_access_token("uuid-123").unwrap();
        let refresh = codec.generate_refresh_token("uuid-123", "jti").unwrap();

        assert!(codec.validate_refresh_token(&access.token).is_err());
        assert!(codec.validate_access_token(&refresh.token).is_err());
    }

    #[test]
    fn test_type_tag_checked_even_with_shared_key() {
        // Bypasses TokenConfig::validate to share one secret between both keys.
        let config = TokenConfig::new(ACCESS_SECRET, ACCESS_SECRET);
        let codec = JwtCodec::new(&config, Arc::new(ManualClock::starting_now()));

        let refresh = codec.generate_refresh_token("uuid-123", "jti").unwrap();
        let result = codec.validate_access_token(&refresh.token);
        assert!(matches!(result, Err(JwtError::WrongTokenType)));
    }

    #[test]
    fn test_invalid_token() {
        let result = codec().validate_access_token("invalid-token");
        assert!(matches!(result, Err(JwtError::Decoding(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let clock = Arc::new(ManualClock::starting_now());
        let codec1 = codec_with_clock(clock.clone());
        let other = TokenConfig::new(
            b"another-access-secret-for-testing!!".to_vec(),
            REFRESH_SECRET,
        );
        let codec2 = JwtCodec::new(&other, clock);

        let result = codec1.generate_access_token("uuid-123").unwrap();
        assert!(codec2.validate_access_token(&result.token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let clock = Arc::new(ManualClock::starting_now());
        let codec = codec_with_clock(clock.clone());

        let access = codec.generate_access_token("uuid-123").unwrap();
        let refresh = codec.generate_refresh_token("uuid-123", "jti").unwrap();

        // Exactly at exp the token is already dead
        clock.advance(300);
        assert!(matches!(
            codec.validate_access_token(&access.token),
            Err(JwtError::Expired)
        ));
        assert!(codec.validate_refresh_token(&refresh.token).is_ok());

        clock.advance(3300);
        assert!(matches!(
            codec.validate_refresh_token(&refresh.token),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_leeway_tolerates_skew() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET)
            .with_ttls(300, 3600)
            .with_leeway(30);
        let codec = JwtCodec::new(&config, clock.clone());

        let access = codec.generate_access_token("uuid-123").unwrap();

        clock.advance(310);
        assert!(codec.validate_access_token(&access.token).is_ok());

        clock.advance(20);
        assert!(codec.validate_access_token(&access.token).is_err());
    }

    #[test]
    fn test_algorithm_mismatch_rejected() {
        let clock = Arc::new(ManualClock::starting_now());
        let hs256 = codec_with_clock(clock.clone());
        let hs512 = JwtCodec::new(
            &TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET).with_algorithm(SigningAlgorithm::Hs512),
            clock,
        );

        let token = hs512.generate_access_token("uuid-123").unwrap().token;
        assert!(hs512.validate_access_token(&token).is_ok());
        assert!(hs256.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_expiry_overflow_is_an_error() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET).with_ttls(u64::MAX, u64::MAX);
        let codec = JwtCodec::new(&config, clock);

        assert!(matches!(
            codec.generate_access_token("uuid-123"),
            Err(JwtError::ExpiryOutOfRange)
        ));
        assert!(matches!(
            codec.generate_refresh_token("uuid-123", "jti-abc"),
            Err(JwtError::ExpiryOutOfRange)
        ));
    }
}
