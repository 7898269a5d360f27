//! Session/auth store collaborator.
//!
//! The store is the single source of truth for auth headers. It is queried
//! once per outgoing request, possibly from many in-flight requests at once,
//! so implementations must be `Send + Sync`. It also owns the logout side
//! effect triggered by a 401.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

/// One auth header value as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthHeaderValue {
    Single(String),
    /// Joined with `,` when attached; missing elements are skipped.
    List(Vec<Option<String>>),
}

impl From<&str> for AuthHeaderValue {
    fn from(value: &str) -> Self {
        AuthHeaderValue::Single(value.to_string())
    }
}

impl From<String> for AuthHeaderValue {
    fn from(value: String) -> Self {
        AuthHeaderValue::Single(value)
    }
}

/// Header name to optional value. `None` entries are dropped before the
/// headers reach a request.
pub type AuthHeaders = BTreeMap<String, Option<AuthHeaderValue>>;

pub trait SessionStore: Send + Sync {
    /// Current auth headers for the next outgoing request.
    fn auth_headers(&self) -> AuthHeaders;

    /// End the session after the server answered with `status`.
    fn force_logout(&self, status: u16);
}

/// In-memory store holding an optional bearer token and fixed extra headers.
///
/// `force_logout` clears the token and remembers the triggering status.
#[derive(Debug, Default)]
pub struct StaticSessionStore {
    token: RwLock<Option<String>>,
    extra: AuthHeaders,
    logouts: AtomicUsize,
    last_logout_status: Mutex<Option<u16>>,
}

impl StaticSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::default();
        store.set_token(Some(token.into()));
        store
    }

    pub fn with_header(mut self, name: impl Into<String>, value: Option<AuthHeaderValue>) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn last_logout_status(&self) -> Option<u16> {
        *self.last_logout_status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for StaticSessionStore {
    fn auth_headers(&self) -> AuthHeaders {
        let mut headers = self.extra.clone();
        headers.insert(
            "Authorization".to_string(),
            self.token()
                .map(|token| AuthHeaderValue::Single(format!("Bearer {token}"))),
        );
        headers
    }

    fn force_logout(&self, status: u16) {
        self.set_token(None);
        *self.last_logout_status.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
        self.logouts.fetch_add(1, Ordering::SeqCst);
        tracing::info!(status, "session ended by server");
    }
}
