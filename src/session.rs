//! Session clearing on logout
//!
//! When the embedded application navigates to its logout endpoint the shell
//! drops every session cookie (cookies without a persistent expiry) and
//! flushes the cookie store so the clearing survives an immediate process
//! kill. Persistent "remember me" cookies are left alone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::CookieError;
use crate::shell::CookieStore;

/// Path fragment that marks a logout navigation
pub const LOGOUT_MARKER: &str = "/logout";

/// A cookie as seen by the shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain attribute
    pub domain: String,
    /// Path attribute
    #[serde(default = "default_path")]
    pub path: String,
    /// Persistent expiry; `None` marks a session cookie
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    /// Create a session cookie
    pub fn session(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            expires: None,
        }
    }

    /// Create a persistent cookie expiring at `expires`
    pub fn persistent(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            expires: Some(expires),
            ..Self::session(name, value, domain)
        }
    }

    /// True when the cookie has no persistent expiry
    pub fn is_session(&self) -> bool {
        self.expires.is_none()
    }

    fn same_slot(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

/// Cookie store held in memory, used by the replay driver and tests
#[derive(Debug, Default)]
pub struct InMemoryCookieStore {
    cookies: Mutex<Vec<Cookie>>,
    flushes: AtomicUsize,
}

impl InMemoryCookieStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cookie (same name, domain and path)
    pub fn set_cookie(&self, cookie: Cookie) {
        let mut cookies = self.cookies.lock();
        match cookies.iter_mut().find(|c| c.same_slot(&cookie)) {
            Some(existing) => *existing = cookie,
            None => cookies.push(cookie),
        }
    }

    /// Snapshot of every stored cookie
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.lock().clone()
    }

    /// Number of flushes performed so far
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl CookieStore for InMemoryCookieStore {
    fn remove_session_cookies(&self) -> Result<usize, CookieError> {
        let mut cookies = self.cookies.lock();
        let before = cookies.len();
        cookies.retain(|c| !c.is_session());
        Ok(before - cookies.len())
    }

    fn flush(&self) -> Result<(), CookieError> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Owns session clearing for one shell
pub struct SessionStore {
    store: Arc<dyn CookieStore>,
}

impl SessionStore {
    /// Create a session store over a cookie engine
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self { store }
    }

    /// Does this navigation target the logout endpoint
    ///
    /// Substring match on the URL path, so `/logout-all` also counts.
    pub fn is_logout_url(url: &str) -> bool {
        Url::parse(url)
            .map(|parsed| parsed.path().contains(LOGOUT_MARKER))
            .unwrap_or(false)
    }

    /// Clear session cookies when `url` is a logout navigation
    ///
    /// Call once per navigation start. Returns whether the logout marker
    /// matched; cookie engine failures are logged and otherwise swallowed.
    #[instrument(skip(self))]
    pub fn clear_on_logout(&self, url: &str) -> bool {
        if !Self::is_logout_url(url) {
            return false;
        }

        match self.store.remove_session_cookies() {
            Ok(removed) => debug!(removed, "removed session cookies"),
            Err(e) => warn!("Session cookie removal failed: {}", e),
        }
        self.persist();

        info!("Local session cleared by logout");
        true
    }

    /// Flush the cookie store without clearing anything
    pub fn persist(&self) {
        if let Err(e) = self.store.flush() {
            warn!("Cookie flush failed: {}", e);
        }
    }
}
