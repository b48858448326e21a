//! Browser sessions and in-flight login state

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use uuid::Uuid;

use crate::users::UserId;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sid";

/// Name of the cookie binding a started login to the browser that started it
pub const LOGIN_STATE_COOKIE: &str = "oauth_state";

/// How long a started login may take before its state token is rejected
pub const PENDING_LOGIN_TTL: Duration = Duration::from_secs(10 * 60);

/// Idle time after which a session is dropped
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
struct Session {
    user_id: UserId,
    last_seen: Instant,
}

/// Signed-in sessions, keyed by cookie value
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a session for a user, returning the cookie value
    pub fn create(&self, user_id: UserId) -> String {
        let sid = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        sessions.retain(|_, s| s.last_seen.elapsed() < ttl);
        sessions.insert(
            sid.clone(),
            Session {
                user_id,
                last_seen: Instant::now(),
            },
        );
        sid
    }

    /// User behind a session; refreshes the idle timer, drops expired sessions
    pub fn user_id(&self, sid: &str) -> Option<UserId> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.get(sid)?.last_seen.elapsed() >= self.ttl {
            sessions.remove(sid);
            return None;
        }
        let session = sessions.get_mut(sid)?;
        session.last_seen = Instant::now();
        Some(session.user_id)
    }

    /// End a session; returns whether it existed
    pub fn remove(&self, sid: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sid)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read a cookie from a request
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Read the session id from a request's cookies
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, SESSION_COOKIE)
}

/// `Set-Cookie` value for a new session
pub fn session_cookie(sid: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, sid)
}

/// `Set-Cookie` value that clears the session cookie
pub fn expired_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    )
}

/// `Set-Cookie` value binding a login state to this browser
pub fn login_state_cookie(state: &str) -> String {
    format!(
        "{}={}; Path=/api/auth; HttpOnly; SameSite=Lax; Max-Age={}",
        LOGIN_STATE_COOKIE,
        state,
        PENDING_LOGIN_TTL.as_secs()
    )
}

/// `Set-Cookie` value that clears the login state cookie
pub const EXPIRED_LOGIN_STATE_COOKIE: &str =
    "oauth_state=; Path=/api/auth; HttpOnly; SameSite=Lax; Max-Age=0";

#[derive(Debug, Clone)]
struct PendingLogin {
    strategy: String,
    redirect_to: Option<String>,
    started: Instant,
}

/// Logins sent to a provider and not yet called back
#[derive(Debug)]
pub struct PendingLogins {
    pending: RwLock<HashMap<String, PendingLogin>>,
    ttl: Duration,
}

impl Default for PendingLogins {
    fn default() -> Self {
        Self::with_ttl(PENDING_LOGIN_TTL)
    }
}

impl PendingLogins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a login and return its state token
    pub fn start(&self, strategy: &str, redirect_to: Option<String>) -> String {
        let state = Uuid::new_v4().simple().to_string();
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        pending.retain(|_, p| p.started.elapsed() < ttl);
        pending.insert(
            state.clone(),
            PendingLogin {
                strategy: strategy.to_string(),
                redirect_to,
                started: Instant::now(),
            },
        );
        state
    }

    /// Consume a state token
    ///
    /// `browser_state` is the state cookie sent by the browser making the callback;
    /// the token is only accepted when it matches, so a state started in one browser
    /// cannot be completed in another. Returns the stored redirect (which may itself
    /// be `None`) when the token exists, belongs to `strategy` and has not expired.
    /// A token can only be used once.
    pub fn finish(
        &self,
        strategy: &str,
        state: &str,
        browser_state: Option<&str>,
    ) -> Option<Option<String>> {
        if browser_state != Some(state) {
            return None;
        }

        let login = self
            .pending
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(state)?;
        if login.strategy != strategy || login.started.elapsed() >= self.ttl {
            return None;
        }
        Some(login.redirect_to)
    }

    pub fn len(&self) -> usize {
        self.pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_lifecycle() {
        let store = SessionStore::new();
        let user_id = Uuid::new_v4();

        let sid = store.create(user_id);
        assert_eq!(store.user_id(&sid), Some(user_id));
        assert_eq!(store.len(), 1);

        assert!(store.remove(&sid));
        assert!(!store.remove(&sid));
        assert_eq!(store.user_id(&sid), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_session_expires() {
        let store = SessionStore::with_ttl(Duration::ZERO);
        let sid = store.create(Uuid::new_v4());

        assert_eq!(store.user_id(&sid), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_sessions_are_evicted_on_create() {
        let store = SessionStore::with_ttl(Duration::ZERO);
        store.create(Uuid::new_v4());
        store.create(Uuid::new_v4());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_session_survives_poisoned_lock() {
        let store = SessionStore::new();
        let user_id = Uuid::new_v4();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.sessions.write().unwrap();
            panic!("handler panicked while holding the session lock");
        }));
        assert!(store.sessions.is_poisoned());

        let sid = store.create(user_id);
        assert_eq!(store.user_id(&sid), Some(user_id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_session_id_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sid=abc123; oauth_state=s1"),
        );
        assert_eq!(session_id(&headers), Some("abc123".to_string()));
        assert_eq!(
            cookie_value(&headers, LOGIN_STATE_COOKIE),
            Some("s1".to_string())
        );
    }

    #[test]
    fn test_session_id_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("sid="));
        assert_eq!(session_id(&headers), None);
    }

    #[test]
    fn test_cookie_formats() {
        assert_eq!(
            session_cookie("abc"),
            "sid=abc; Path=/; HttpOnly; SameSite=Lax"
        );
        assert!(expired_session_cookie().contains("Max-Age=0"));
        assert_eq!(
            login_state_cookie("s1"),
            "oauth_state=s1; Path=/api/auth; HttpOnly; SameSite=Lax; Max-Age=600"
        );
    }

    #[test]
    fn test_pending_login_single_use() {
        let pending = PendingLogins::new();
        let state = pending.start("linkedin", Some("/settings".to_string()));

        assert_eq!(
            pending.finish("linkedin", &state, Some(state.as_str())),
            Some(Some("/settings".to_string()))
        );
        assert_eq!(pending.finish("linkedin", &state, Some(state.as_str())), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pending_login_requires_matching_browser_state() {
        let pending = PendingLogins::new();
        let state = pending.start("linkedin", None);
        let other = pending.start("linkedin", None);

        assert_eq!(pending.finish("linkedin", &state, None), None);
        assert_eq!(pending.finish("linkedin", &state, Some(other.as_str())), None);
        // Rejected attempts leave the login usable by its own browser
        assert_eq!(pending.finish("linkedin", &state, Some(state.as_str())), Some(None));
    }

    #[test]
    fn test_pending_login_wrong_strategy() {
        let pending = PendingLogins::new();
        let state = pending.start("linkedin", None);
        assert_eq!(pending.finish("github", &state, Some(state.as_str())), None);
    }

    #[test]
    fn test_pending_login_expires() {
        let pending = PendingLogins::with_ttl(Duration::ZERO);
        let state = pending.start("linkedin", None);
        assert_eq!(pending.finish("linkedin", &state, Some(state.as_str())), None);
    }

    #[test]
    fn test_unknown_state_rejected() {
        let pending = PendingLogins::new();
        assert_eq!(pending.finish("linkedin", "forged", Some("forged")), None);
    }
}
