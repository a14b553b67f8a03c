//! Token-based authentication.
//!
//! Dual-token system: short-lived access tokens (stateless) and long-lived
//! refresh tokens (one database row each, rotated on every use). Expired
//! access tokens are not refreshed implicitly; clients call the refresh
//! endpoint.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod session;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, auth_cookie, clear_cookie, get_bearer_token,
    get_cookie,
};
pub use errors::{ApiAuthError, AuthError};
pub use extractors::{Auth, access_token};
pub use ip::extract_client_ip;
pub use session::{Session, SessionService, UserDirectory};
pub use state::HasSessions;
