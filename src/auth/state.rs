//! Authentication state trait and macro.

use super::session::SessionService;

/// Trait for state types that can authenticate requests.
pub trait HasSessions {
    fn sessions(&self) -> &SessionService;
    fn secure_cookies(&self) -> bool;
}

/// Implement `HasSessions` for a state struct with the standard fields.
///
/// The struct must have these fields:
/// - `sessions: SessionService`
/// - `secure_cookies: bool`
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// pub struct MyState {
///     pub sessions: SessionService,
///     pub secure_cookies: bool,
/// }
///
/// impl_has_sessions!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_sessions {
    ($state_type:ty) => {
        impl $crate::auth::HasSessions for $state_type {
            fn sessions(&self) -> &$crate::auth::SessionService {
                &self.sessions
            }
            fn secure_cookies(&self) -> bool {
                self.secure_cookies
            }
        }
    };
}
