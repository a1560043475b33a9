//! Authenticated or anonymous session of a request.

use crate::pool::Reset;
use chrono::{DateTime, Duration, Local};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Default session lifetime for anonymous sessions.
pub const DEFAULT_SESSION_EXPIRE_HOURS: i64 = 24;

/// Longest accepted anonymous session lifetime.
pub const MAX_SESSION_EXPIRE_HOURS: i64 = 720;

/// Prefix of anonymous pseudo-identities.
pub const ANONYMOUS_PREFIX: &str = "ANONYMOUS_";

/// Identity returned by the session lookup callback.
///
/// Application code stores its own account data behind this trait and can
/// recover it with [`downcast_ref`](trait.SessionInfo.html#method.downcast_ref).
pub trait SessionInfo: Any + Send + Sync + fmt::Debug {
    /// Identifier of the account.
    fn user_id(&self) -> &str;

    /// When the session stops being valid.
    fn expire_at(&self) -> DateTime<Local>;

    /// Upcast used for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl dyn SessionInfo {
    /// Returns the concrete session data, if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: SessionInfo>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Session resolved for one request.
///
/// An anonymous session has no `session_info` and a generated `user_id`.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    /// `true` when no account is attached.
    pub is_anonymous: bool,
    /// Account id, or the pseudo-identity of an anonymous session.
    pub user_id: String,
    /// Token the session was resolved from; empty if none was sent.
    pub session_id: String,
    /// Expiry of the session.
    pub expire_at: DateTime<Local>,
    /// Client address.
    pub client_ip: String,
    /// Client user agent.
    pub client_ua: String,
    /// Data returned by the session lookup callback.
    pub session_info: Option<Arc<dyn SessionInfo>>,
}

impl AuthSession {
    /// Turns this session into an anonymous one.
    pub fn make_anonymous(&mut self, now: DateTime<Local>, expire_in: Duration) {
        self.is_anonymous = true;
        self.user_id = anonymous_user_id(now);
        self.expire_at = now + expire_in;
        self.session_info = None;
    }

    /// Turns this session into an authenticated one backed by `info`.
    pub fn authenticate(&mut self, info: Arc<dyn SessionInfo>) {
        self.is_anonymous = false;
        self.user_id = info.user_id().to_string();
        self.expire_at = info.expire_at();
        self.session_info = Some(info);
    }

    /// Returns the session data as a `T`, if it is one.
    #[must_use]
    pub fn info<T: SessionInfo>(&self) -> Option<&T> {
        self.session_info.as_deref().and_then(|info| info.downcast_ref::<T>())
    }
}

impl Reset for AuthSession {
    fn reset(&mut self) {
        self.is_anonymous = false;
        self.user_id.clear();
        self.session_id.clear();
        self.expire_at = DateTime::<Local>::default();
        self.client_ip.clear();
        self.client_ua.clear();
        self.session_info = None;
    }
}

/// Pseudo-identity for an anonymous session: `ANONYMOUS_yyMMddHHmmss.ffffff`.
#[must_use]
pub fn anonymous_user_id(now: DateTime<Local>) -> String {
    format!("{ANONYMOUS_PREFIX}{}", now.format("%y%m%d%H%M%S%.6f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug)]
    struct Account {
        id: String,
        plan: &'static str,
    }

    impl SessionInfo for Account {
        fn user_id(&self) -> &str {
            &self.id
        }

        fn expire_at(&self) -> DateTime<Local> {
            Local.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_anonymous_identity_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap();
        assert_eq!(anonymous_user_id(now), "ANONYMOUS_240309080706.000000");
    }

    #[test]
    fn test_make_anonymous() {
        let now = Local::now();
        let mut session = AuthSession::default();
        session.make_anonymous(now, Duration::hours(24));
        assert!(session.is_anonymous);
        assert!(session.user_id.starts_with(ANONYMOUS_PREFIX));
        assert!(session.session_info.is_none());
        assert_eq!(session.expire_at, now + Duration::hours(24));
    }

    #[test]
    fn test_authenticate_and_downcast() {
        let mut session = AuthSession::default();
        session.authenticate(Arc::new(Account {
            id: "u-1".into(),
            plan: "pro",
        }));
        assert!(!session.is_anonymous);
        assert_eq!(session.user_id, "u-1");
        assert_eq!(session.info::<Account>().map(|a| a.plan), Some("pro"));
    }

    #[test]
    fn test_reset_drops_identity() {
        let mut session = AuthSession::default();
        session.authenticate(Arc::new(Account {
            id: "u-1".into(),
            plan: "free",
        }));
        session.client_ip.push_str("10.0.0.1");
        session.reset();
        assert!(session.user_id.is_empty());
        assert!(session.client_ip.is_empty());
        assert!(session.session_info.is_none());
    }
}
