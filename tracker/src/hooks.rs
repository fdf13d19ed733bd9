//! Uncaught error dispatch.
//!
//! [`ErrorHooks`] owns an ordered list of handlers that are told about
//! uncaught errors. Handlers run in registration order, followed by an
//! optional fallback: the handler that was in charge before the tracker
//! arrived. The tracker registers itself under a reserved [`HookId`], which
//! makes its registration idempotent.
//!
//! [`install_panic_hook`] wires a dispatcher into the process panic hook,
//! keeping the previously installed panic hook as the last link of the chain.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, Location};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

/// Handler invoked for every uncaught error.
pub type ErrorHandler = Arc<dyn Fn(&UncaughtError) + Send + Sync>;

/// An uncaught error as seen by the hook chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncaughtError {
    /// Human-readable error message.
    pub message: String,

    /// Where the error was raised (file or URL), if known.
    pub source: Option<String>,

    /// Line number, if known.
    pub line: Option<u32>,

    /// Column number, if known.
    pub column: Option<u32>,

    /// Stack trace, if one was captured.
    pub stack: Option<String>,
}

impl UncaughtError {
    /// Creates an error with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            line: None,
            column: None,
            stack: None,
        }
    }

    /// Sets the source location.
    #[must_use]
    pub fn at(mut self, source: impl Into<String>, line: u32, column: u32) -> Self {
        self.source = Some(source.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Sets the stack trace.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Builds an error from a panic payload and location.
    fn from_panic(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());

        let mut error = Self::new(message);
        if let Some(location) = location {
            error = error.at(location.file(), location.line(), location.column());
        }

        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            error.stack = Some(backtrace.to_string());
        }

        error
    }
}

/// Identifies a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Ordered dispatcher for uncaught errors.
pub struct ErrorHooks {
    handlers: RwLock<Vec<(HookId, ErrorHandler)>>,
    fallback: RwLock<Option<ErrorHandler>>,
    next_id: AtomicU64,
    panic_hook_installed: AtomicBool,
}

impl Default for ErrorHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHooks")
            .field("handlers", &self.len())
            .field("has_fallback", &self.has_fallback())
            .finish()
    }
}

impl ErrorHooks {
    /// Creates a dispatcher with no handlers and no fallback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            fallback: RwLock::new(None),
            next_id: AtomicU64::new(1),
            panic_hook_installed: AtomicBool::new(false),
        }
    }

    /// Creates a dispatcher whose chain ends with `fallback`.
    #[must_use]
    pub fn with_fallback(fallback: ErrorHandler) -> Self {
        let hooks = Self::new();
        hooks.set_fallback(fallback);
        hooks
    }

    /// Reserves an id for a later [`register_as`](Self::register_as).
    pub fn reserve_id(&self) -> HookId {
        HookId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends `handler` to the chain and returns its id.
    pub fn register(&self, handler: ErrorHandler) -> HookId {
        let id = self.reserve_id();
        self.write_handlers().push((id, handler));
        id
    }

    /// Appends `handler` under `id` unless a handler with that id is
    /// already present.
    ///
    /// Returns true if the handler was added.
    pub fn register_as(&self, id: HookId, handler: ErrorHandler) -> bool {
        let mut handlers = self.write_handlers();
        if handlers.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        handlers.push((id, handler));
        true
    }

    /// Removes the handler registered under `id`.
    ///
    /// Returns true if a handler was removed.
    pub fn unregister(&self, id: HookId) -> bool {
        let mut handlers = self.write_handlers();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Returns true if a handler is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: HookId) -> bool {
        self.read_handlers()
            .iter()
            .any(|(existing, _)| *existing == id)
    }

    /// Number of registered handlers, not counting the fallback.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_handlers().len()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_handlers().is_empty()
    }

    /// Replaces the fallback handler.
    pub fn set_fallback(&self, fallback: ErrorHandler) {
        *self
            .fallback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(fallback);
    }

    /// Returns true if a fallback handler is set.
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns true once [`install_panic_hook`] has wired this dispatcher.
    #[must_use]
    pub fn is_panic_hook_installed(&self) -> bool {
        self.panic_hook_installed.load(Ordering::SeqCst)
    }

    /// Invokes every handler in registration order, then the fallback.
    ///
    /// Handlers run outside the dispatcher's locks, so a handler may itself
    /// register or unregister handlers; such changes apply to the next
    /// dispatch.
    pub fn dispatch(&self, error: &UncaughtError) {
        let handlers: Vec<ErrorHandler> = self
            .read_handlers()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        let fallback = self
            .fallback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        debug!(
            handlers = handlers.len(),
            fallback = fallback.is_some(),
            "Dispatching uncaught error"
        );

        for handler in handlers {
            handler(error);
        }
        if let Some(fallback) = fallback {
            fallback(error);
        }
    }

    fn read_handlers(&self) -> std::sync::RwLockReadGuard<'_, Vec<(HookId, ErrorHandler)>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_handlers(&self) -> std::sync::RwLockWriteGuard<'_, Vec<(HookId, ErrorHandler)>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Routes process panics through `hooks`.
///
/// The panic hook in place before the first call runs after every handler
/// in `hooks`, so default panic output (or a host's own hook) is preserved.
/// Each dispatcher is wired at most once; returns false if `hooks` was
/// already installed.
pub fn install_panic_hook(hooks: Arc<ErrorHooks>) -> bool {
    if hooks.panic_hook_installed.swap(true, Ordering::SeqCst) {
        return false;
    }

    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let error = UncaughtError::from_panic(info.payload(), info.location());
        hooks.dispatch(&error);
        previous(info);
    }));

    debug!("Panic hook installed");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> ErrorHandler {
        let log = Arc::clone(log);
        Arc::new(move |error: &UncaughtError| {
            log.lock().unwrap().push(format!("{name}:{}", error.message));
        })
    }

    #[test]
    fn dispatch_runs_handlers_in_registration_order_then_fallback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = ErrorHooks::with_fallback(recorder(&log, "host"));
        hooks.register(recorder(&log, "first"));
        hooks.register(recorder(&log, "second"));

        hooks.dispatch(&UncaughtError::new("boom"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:boom", "second:boom", "host:boom"]
        );
    }

    #[test]
    fn register_as_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = ErrorHooks::new();
        let id = hooks.reserve_id();

        assert!(hooks.register_as(id, recorder(&log, "tracker")));
        assert!(!hooks.register_as(id, recorder(&log, "tracker")));
        assert_eq!(hooks.len(), 1);

        hooks.dispatch(&UncaughtError::new("once"));
        assert_eq!(*log.lock().unwrap(), vec!["tracker:once"]);
    }

    #[test]
    fn plain_register_is_not_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = ErrorHooks::new();
        let handler = recorder(&log, "h");

        let a = hooks.register(Arc::clone(&handler));
        let b = hooks.register(handler);

        assert_ne!(a, b);
        hooks.dispatch(&UncaughtError::new("x"));
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn unregister_removes_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = ErrorHooks::new();
        let id = hooks.register(recorder(&log, "h"));

        assert!(hooks.contains(id));
        assert!(hooks.unregister(id));
        assert!(!hooks.unregister(id));
        assert!(hooks.is_empty());

        hooks.dispatch(&UncaughtError::new("x"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn handler_may_register_during_dispatch() {
        let hooks = Arc::new(ErrorHooks::new());
        let inner = Arc::clone(&hooks);
        hooks.register(Arc::new(move |_: &UncaughtError| {
            inner.register(Arc::new(|_: &UncaughtError| {}));
        }));

        hooks.dispatch(&UncaughtError::new("x"));
        assert_eq!(hooks.len(), 2);
    }

    #[test]
    fn from_panic_extracts_str_and_string_payloads() {
        let location = Location::caller();

        let from_str = UncaughtError::from_panic(&"static message", Some(location));
        assert_eq!(from_str.message, "static message");
        assert_eq!(from_str.source.as_deref(), Some(location.file()));
        assert_eq!(from_str.line, Some(location.line()));
        assert_eq!(from_str.column, Some(location.column()));

        let from_string = UncaughtError::from_panic(&"owned".to_string(), None);
        assert_eq!(from_string.message, "owned");
        assert_eq!(from_string.source, None);

        let opaque = UncaughtError::from_panic(&42_u8, None);
        assert_eq!(opaque.message, "Box<dyn Any>");
    }

    #[test]
    fn builder_methods() {
        let error = UncaughtError::new("msg")
            .at("app.js", 10, 4)
            .with_stack("at main");

        assert_eq!(error.source.as_deref(), Some("app.js"));
        assert_eq!(error.line, Some(10));
        assert_eq!(error.column, Some(4));
        assert_eq!(error.stack.as_deref(), Some("at main"));
    }
}
