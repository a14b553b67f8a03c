//! Refresh token identifiers.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// Number of random bytes in a jti (256 bits).
pub const JTI_BYTES: usize = 32;

/// Source of unique refresh token identifiers.
pub trait JtiSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Draws jtis from the thread-local CSPRNG, URL-safe base64 without padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsJtiSource;

impl JtiSource for OsJtiSource {
    fn generate(&self) -> String {
        let mut bytes = [0u8; JTI_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
