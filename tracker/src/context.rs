//! Client context and the host environment.
//!
//! The [`Environment`] trait is the tracker's only window onto its host:
//! where it is running, who is running it, and a monotonic clock for
//! timers. [`ContextCache`] snapshots the static facts once and hands out
//! the same [`ClientContext`] for the lifetime of the tracker. The snapshot
//! is never refreshed, so a host that changes location after the first
//! record keeps reporting the original URL.

use std::sync::OnceLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Static environment facts attached to outgoing records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    /// Location of the host (a page URL, or `file://` path for processes).
    pub url: String,

    /// User agent string, `null` when unknown.
    pub user_agent: Option<String>,

    /// Platform string, `null` when unknown.
    pub platform: Option<String>,
}

/// Accessors for the host environment.
pub trait Environment: Send + Sync {
    /// Current location of the host.
    fn location(&self) -> String;

    /// User agent string, if the host has one.
    fn user_agent(&self) -> Option<String>;

    /// Platform string, if the host has one.
    fn platform(&self) -> Option<String>;

    /// Monotonic time in milliseconds, or `None` when no clock is available.
    fn now_ms(&self) -> Option<f64>;
}

/// An [`Environment`] with fixed facts and an optional monotonic clock.
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    location: String,
    user_agent: Option<String>,
    platform: Option<String>,
    clock: Option<Instant>,
}

impl StaticEnvironment {
    /// Creates an environment at `location` with the crate's user agent,
    /// the compile-time OS as platform, and a running clock.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            user_agent: Some(default_user_agent()),
            platform: Some(std::env::consts::OS.to_string()),
            clock: Some(Instant::now()),
        }
    }

    /// Creates an environment describing the current process.
    ///
    /// The location is the working directory as a `file://` URL.
    #[must_use]
    pub fn for_process() -> Self {
        let location = std::env::current_dir()
            .map(|dir| format!("file://{}", dir.display()))
            .unwrap_or_else(|_| "file://".to_string());
        Self::new(location)
    }

    /// Overrides the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Overrides the platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Option<String>) -> Self {
        self.platform = platform;
        self
    }

    /// Removes the monotonic clock, disabling timers.
    #[must_use]
    pub fn without_clock(mut self) -> Self {
        self.clock = None;
        self
    }
}

impl Environment for StaticEnvironment {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn platform(&self) -> Option<String> {
        self.platform.clone()
    }

    fn now_ms(&self) -> Option<f64> {
        self.clock
            .map(|origin| origin.elapsed().as_secs_f64() * 1000.0)
    }
}

/// `simple-tracker/<version>`.
fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Memoized [`ClientContext`].
#[derive(Debug, Default)]
pub struct ContextCache {
    cached: OnceLock<ClientContext>,
}

impl ContextCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached context, computing it from `env` on first use.
    pub fn get(&self, env: &dyn Environment) -> &ClientContext {
        self.cached.get_or_init(|| ClientContext {
            url: env.location(),
            user_agent: env.user_agent(),
            platform: env.platform(),
        })
    }

    /// Returns true once the context has been computed.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached.get().is_some()
    }
}
