//! SimpleTracker - fire-and-forget event, metric and exception capture.
//!
//! This crate collects application events, log messages, metrics and
//! uncaught errors, tags them with a session identifier and client context,
//! and posts them as JSON to a collector endpoint.
//!
//! # Overview
//!
//! Everything goes through [`Tracker::push`]. A pushed object may carry
//! directive keys (`endpoint`, `devMode`, `attachClientContext`,
//! `sessionId`, `sendCaughtExceptions`) that configure the tracker; what is
//! left after the directives are stripped is delivered. Nothing is delivered
//! until an endpoint is set.
//!
//! Delivery is best-effort: records are sent once, on a background task,
//! and failures are only logged.
//!
//! # Modules
//!
//! - [`tracker`]: The push pipeline and convenience methods
//! - [`record`]: Directive parsing and typed payloads
//! - [`session`]: Session identifier resolution and persistence
//! - [`cookie`]: Cookie-equivalent persistent storage
//! - [`context`]: Client context and host environment
//! - [`timer`]: Start/stop duration timers
//! - [`transport`]: Fire-and-forget HTTP delivery
//! - [`hooks`]: Uncaught error dispatch and panic hook integration
//! - [`bootstrap`]: Replaying pushes recorded before initialization
//! - [`config`]: Settings from environment variables
//! - [`error`]: Error types

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod cookie;
pub mod error;
pub mod hooks;
pub mod record;
pub mod session;
pub mod timer;
pub mod tracker;
pub mod transport;

pub use bootstrap::{bootstrap, PreloadQueue, TrackerSlot};
pub use config::{ConfigError, Settings};
pub use context::{ClientContext, Environment, StaticEnvironment};
pub use cookie::{CookieError, CookieJar, FileCookieJar, MemoryCookieJar};
pub use error::{Result, TrackerError};
pub use hooks::{install_panic_hook, ErrorHandler, ErrorHooks, HookId, UncaughtError};
pub use record::{ConfigPatch, EventRecord, Payload, Record};
pub use session::{SessionStore, SESSION_KEY};
pub use timer::{TimerError, TimerRegistry, TimerStart};
pub use tracker::{Dispatch, Tracker, TrackerBuilder, TrackerConfig};
pub use transport::{HttpTransport, Transport, TransportError};
