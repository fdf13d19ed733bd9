//! Session identity management.
//!
//! The [`SessionStore`] resolves the session identifier attached to every
//! outgoing record and keeps it persisted in a [`CookieJar`] so that a fresh
//! tracker (a page reload, a process restart) picks up the same session.
//!
//! # Resolution Order
//!
//! [`SessionStore::ensure`] resolves, in priority order:
//!
//! 1. an explicit override
//! 2. the identifier already resolved by this store
//! 3. the identifier persisted in the jar
//! 4. a freshly generated UUID v4
//!
//! The resolved value is always written back to the jar.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cookie::{find_value, CookieJar};

/// Cookie key holding the session identifier.
pub const SESSION_KEY: &str = "trcksesh";

/// Resolves and persists the tracker's session identifier.
pub struct SessionStore {
    jar: Arc<dyn CookieJar>,
    current: Option<String>,
}

impl SessionStore {
    /// Creates a store over the given jar. No identifier is resolved yet.
    #[must_use]
    pub fn new(jar: Arc<dyn CookieJar>) -> Self {
        Self { jar, current: None }
    }

    /// Returns the identifier resolved so far, if any.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Reads the persisted session identifier from the jar.
    ///
    /// Returns `None` if the key is absent, empty, or the jar cannot be read.
    #[must_use]
    pub fn read_persisted(&self) -> Option<String> {
        let raw = match self.jar.raw() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read session cookie");
                return None;
            }
        };

        find_value(&raw, SESSION_KEY)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Writes the session identifier into the jar.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn persist(&self, value: &str) {
        if let Err(e) = self.jar.set(SESSION_KEY, value) {
            warn!(error = %e, "Failed to persist session cookie");
        }
    }

    /// Resolves the session identifier and re-persists it.
    ///
    /// An empty `explicit` value counts as no override.
    pub fn ensure(&mut self, explicit: Option<&str>) -> String {
        let resolved = explicit
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| self.current.clone())
            .or_else(|| self.read_persisted())
            .unwrap_or_else(generate_session_id);

        debug!(session_id = %resolved, "Session resolved");

        self.persist(&resolved);
        self.current = Some(resolved.clone());
        resolved
    }
}

/// Generates a fresh random session identifier.
#[must_use]
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}
