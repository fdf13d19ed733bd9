//! The push pipeline.
//!
//! [`Tracker`] is the single entry point of the crate. Every call, whether a
//! raw [`push`](Tracker::push) or one of the `log_*` / timer conveniences,
//! ends up in the same pipeline:
//!
//! 1. The pushed value is parsed into a [`Record`]; anything that is not an
//!    object or a string is discarded.
//! 2. Directives are applied to the configuration in a fixed order
//!    (see [`Tracker::configure`]).
//! 3. The remaining payload is enriched with `sessionId` (and `context`
//!    when enabled) and handed to the [`Transport`], or only logged in dev
//!    mode.
//!
//! Each push mutates state completely before the transport is involved, so
//! configuration changes are strictly ordered even though deliveries are
//! not.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use simple_tracker::Tracker;
//!
//! # fn main() -> simple_tracker::Result<()> {
//! let tracker = Tracker::builder().build()?;
//!
//! tracker.push(json!({"endpoint": "https://collector.example.com/events"}));
//! tracker.log_event("signup");
//! tracker.log_message("cache warmed", Some("info"));
//!
//! tracker.start_timer("checkout");
//! tracker.stop_timer("checkout");
//! # Ok(())
//! # }
//! ```

use std::cell::RefCell;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::context::{ClientContext, ContextCache, Environment, StaticEnvironment};
use crate::cookie::{CookieJar, MemoryCookieJar};
use crate::error::Result;
use crate::hooks::{install_panic_hook, ErrorHandler, ErrorHooks, HookId, UncaughtError};
use crate::record::{ConfigPatch, EventRecord, Payload, Record, SESSION_ID_KEY};
use crate::session::SessionStore;
use crate::timer::{TimerError, TimerRegistry, TimerStart};
use crate::transport::{HttpTransport, Transport};

/// Key under which the client context is attached.
const CONTEXT_KEY: &str = "context";

/// Stack reported for uncaught errors without a stack trace.
const NO_STACK: &str = "n/a";

thread_local! {
    /// Trackers whose critical section the current thread is inside.
    static IN_PIPELINE: RefCell<Vec<*const Inner>> = const { RefCell::new(Vec::new()) };
}

/// Process-wide tracker configuration, changed only through directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Collector URL. Nothing is delivered until this is set.
    pub endpoint: Option<String>,

    /// Log records instead of sending them.
    pub dev_mode: bool,

    /// Attach the client context to every record.
    pub attach_client_context: bool,

    /// Whether uncaught errors should be reported.
    pub send_caught_exceptions: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            dev_mode: false,
            attach_client_context: true,
            send_caught_exceptions: true,
        }
    }
}

/// What the pipeline did with a push.
///
/// Purely informational; callers are free to ignore it.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The value was neither an object nor a string.
    Discarded,
    /// No endpoint is configured, or nothing was left after directives.
    Skipped,
    /// Dev mode: the enriched record was logged instead of sent.
    Logged(EventRecord),
    /// The enriched record was handed to the transport.
    Sent(EventRecord),
}

impl Dispatch {
    /// Returns the enriched record, if one was produced.
    #[must_use]
    pub fn record(&self) -> Option<&EventRecord> {
        match self {
            Self::Logged(record) | Self::Sent(record) => Some(record),
            Self::Discarded | Self::Skipped => None,
        }
    }
}

/// Mutable pipeline state.
struct State {
    config: TrackerConfig,
    session: SessionStore,
    timers: TimerRegistry,
}

struct Inner {
    state: Mutex<State>,
    env: Arc<dyn Environment>,
    transport: Arc<dyn Transport>,
    hooks: Arc<ErrorHooks>,
    hook_id: HookId,
    context: ContextCache,
}

/// Builder for [`Tracker`].
///
/// Every collaborator has a default: an in-memory cookie jar, the current
/// process as environment, [`HttpTransport`], and a private
/// [`ErrorHooks`] dispatcher. Whichever dispatcher is used, it is wired into
/// the process panic hook the first time `sendCaughtExceptions` is enabled.
#[derive(Default)]
pub struct TrackerBuilder {
    jar: Option<Arc<dyn CookieJar>>,
    env: Option<Arc<dyn Environment>>,
    transport: Option<Arc<dyn Transport>>,
    hooks: Option<Arc<ErrorHooks>>,
}

impl TrackerBuilder {
    /// Sets the cookie jar holding the persisted session identifier.
    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Sets the host environment.
    #[must_use]
    pub fn environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = Some(env);
        self
    }

    /// Sets the transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the uncaught error dispatcher the tracker registers itself with.
    #[must_use]
    pub fn error_hooks(mut self, hooks: Arc<ErrorHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Builds the tracker.
    ///
    /// # Errors
    ///
    /// Returns an error if no transport was given and the default
    /// [`HttpTransport`] cannot be created.
    pub fn build(self) -> Result<Tracker> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        let jar = self
            .jar
            .unwrap_or_else(|| Arc::new(MemoryCookieJar::new()));
        let env = self
            .env
            .unwrap_or_else(|| Arc::new(StaticEnvironment::for_process()));
        let hooks = self.hooks.unwrap_or_default();
        let hook_id = hooks.reserve_id();

        Ok(Tracker {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    config: TrackerConfig::default(),
                    session: SessionStore::new(jar),
                    timers: TimerRegistry::new(),
                }),
                env,
                transport,
                hooks,
                hook_id,
                context: ContextCache::new(),
            }),
        })
    }
}

/// Event, metric, message and exception tracker.
///
/// Cloning is cheap and yields a handle to the same tracker.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.config())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Returns a builder with default collaborators.
    #[must_use]
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// Returns true if both handles refer to the same tracker.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Pushes a directive and/or payload through the pipeline.
    ///
    /// Objects have their directive keys applied and stripped; strings are
    /// delivered as `{"text": ...}`; anything else is silently discarded.
    pub fn push(&self, data: impl Into<Value>) -> Dispatch {
        let Some(record) = Record::parse(data.into()) else {
            return Dispatch::Discarded;
        };

        self.with_state(|state| {
            self.apply(state, record.patch);
            self.track(state, record.payload)
        })
    }

    /// Applies a configuration patch and returns the resulting configuration.
    ///
    /// Directives are applied in this order: `dev_mode`,
    /// `attach_client_context`, `session_id`, `endpoint` (establishing a
    /// session first if none exists), `send_caught_exceptions`.
    pub fn configure(&self, patch: ConfigPatch) -> TrackerConfig {
        self.with_state(|state| {
            self.apply(state, patch);
            state.config.clone()
        })
    }

    /// Returns a snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> TrackerConfig {
        self.with_state(|state| state.config.clone())
    }

    /// Returns the resolved session identifier, if one exists yet.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.with_state(|state| state.session.current().map(str::to_string))
    }

    /// Returns the client context, computing it on first use.
    #[must_use]
    pub fn context(&self) -> ClientContext {
        self.inner.context.get(self.inner.env.as_ref()).clone()
    }

    /// Returns the dispatcher the tracker registers its error handler with.
    #[must_use]
    pub fn error_hooks(&self) -> &Arc<ErrorHooks> {
        &self.inner.hooks
    }

    /// Returns true if a timer is running for `metric`.
    #[must_use]
    pub fn is_timer_running(&self, metric: &str) -> bool {
        self.with_state(|state| state.timers.is_running(metric))
    }

    /// Emits `{type: "event", event}`.
    pub fn log_event(&self, event: impl Into<Value>) {
        self.push(json!({
            "type": "event",
            "event": event.into(),
        }));
    }

    /// Emits `{level: "error", type: "exception", exception}`.
    pub fn log_exception(&self, exception: impl Into<Value>) {
        self.push(json!({
            "level": "error",
            "type": "exception",
            "exception": exception.into(),
        }));
    }

    /// Emits `{type: "message", message, level}`; `level` is left out when
    /// `None` or empty.
    pub fn log_message(&self, message: impl Into<Value>, level: Option<&str>) {
        let mut data = json!({
            "type": "message",
            "message": message.into(),
        });

        if let Some(level) = level.filter(|level| !level.is_empty()) {
            data["level"] = Value::String(level.to_string());
        }

        self.push(data);
    }

    /// Emits `{type: "metric", metric, value}`.
    pub fn log_metric(&self, metric: &str, value: impl Into<Value>) {
        self.push(json!({
            "type": "metric",
            "metric": metric,
            "value": value.into(),
        }));
    }

    /// Starts the timer for `metric`, overwriting a running one.
    pub fn start_timer(&self, metric: &str) {
        let now = self.inner.env.now_ms();
        let result = self.with_state(|state| state.timers.start(metric, now));

        match result {
            Ok(TimerStart::Started) => debug!(metric = %metric, "timer started"),
            Ok(TimerStart::Restarted) => {
                warn!("Timing metric '{metric}' already started");
                debug!(metric = %metric, "timer started");
            }
            Err(e) => warn!(metric = %metric, "{e}"),
        }
    }

    /// Stops the timer for `metric` and emits the elapsed milliseconds as a
    /// metric.
    ///
    /// Warns and emits nothing if the timer was not started. Does nothing at
    /// all when the host has no clock.
    pub fn stop_timer(&self, metric: &str) {
        let now = self.inner.env.now_ms();
        let result = self.with_state(|state| state.timers.stop(metric, now));

        match result {
            Ok(Some(elapsed)) => {
                debug!(metric = %metric, time = elapsed, "timer stopped");
                self.log_metric(metric, elapsed);
            }
            Ok(None) => {}
            Err(e @ TimerError::NotStarted(_)) => warn!("{e}"),
            Err(e) => warn!(metric = %metric, "{e}"),
        }
    }

    /// Reports an uncaught error as an exception record
    /// `{message, lineno, colno, stack}`.
    ///
    /// Public so hosts can compose their own error handlers around it. An
    /// error raised while this thread is inside the tracker's own pipeline
    /// is logged and dropped; other trackers still report it.
    pub fn on_error(&self, error: &UncaughtError) {
        if PipelineGuard::is_inside(&self.inner) {
            warn!(
                message = %error.message,
                "Uncaught error raised inside the tracker pipeline, not reported"
            );
            return;
        }

        self.log_exception(json!({
            "message": error.message,
            "lineno": error.line,
            "colno": error.column,
            "stack": error.stack.as_deref().unwrap_or(NO_STACK),
        }));
    }

    /// Runs `f` inside the pipeline's critical section.
    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _guard = PipelineGuard::enter(&self.inner);
        f(&mut state)
    }

    fn apply(&self, state: &mut State, patch: ConfigPatch) {
        if let Some(dev_mode) = patch.dev_mode {
            state.config.dev_mode = dev_mode;
        }

        if let Some(attach) = patch.attach_client_context {
            state.config.attach_client_context = attach;
        }

        if let Some(session_id) = patch.session_id.as_deref() {
            state.session.ensure(Some(session_id));
        }

        if let Some(endpoint) = patch.endpoint {
            if state.session.current().is_none() {
                state.session.ensure(None);
            }
            info!(endpoint = %endpoint, "Tracking endpoint configured");
            state.config.endpoint = Some(endpoint);
        }

        if let Some(send) = patch.send_caught_exceptions {
            state.config.send_caught_exceptions = send;
            if send {
                self.install_error_hook();
            }
        }
    }

    fn track(&self, state: &State, payload: Payload) -> Dispatch {
        let Some(endpoint) = state.config.endpoint.as_deref() else {
            return Dispatch::Skipped;
        };
        if payload.is_empty() {
            return Dispatch::Skipped;
        }

        let mut record = payload.into_map();
        record.insert(
            SESSION_ID_KEY.to_string(),
            state
                .session
                .current()
                .map_or(Value::Null, |id| Value::String(id.to_string())),
        );

        if state.config.attach_client_context {
            let context = self.inner.context.get(self.inner.env.as_ref());
            match serde_json::to_value(context) {
                Ok(context) => {
                    record.insert(CONTEXT_KEY.to_string(), context);
                }
                Err(e) => warn!(error = %e, "Failed to serialize client context"),
            }
        }

        if state.config.dev_mode {
            let body = Value::Object(record.clone());
            debug!(record = %body, "SimpleTracker: POST {endpoint}");
            return Dispatch::Logged(record);
        }

        self.inner.transport.post(endpoint, &record);
        Dispatch::Sent(record)
    }

    /// Registers this tracker's error handler and routes process panics to
    /// its dispatcher. Registering twice is a no-op.
    fn install_error_hook(&self) {
        let weak = Arc::downgrade(&self.inner);
        let handler: ErrorHandler = Arc::new(move |error: &UncaughtError| {
            if let Some(inner) = weak.upgrade() {
                Tracker { inner }.on_error(error);
            }
        });

        if self.inner.hooks.register_as(self.inner.hook_id, handler) {
            debug!("Uncaught error reporting enabled");
        } else {
            debug!("Uncaught error reporting already enabled");
        }

        install_panic_hook(Arc::clone(&self.inner.hooks));
    }
}

/// Marks the current thread as inside one tracker's pipeline until dropped.
struct PipelineGuard;

impl PipelineGuard {
    fn enter(inner: &Arc<Inner>) -> Self {
        IN_PIPELINE.with(|active| active.borrow_mut().push(Arc::as_ptr(inner)));
        Self
    }

    fn is_inside(inner: &Arc<Inner>) -> bool {
        let ptr = Arc::as_ptr(inner);
        IN_PIPELINE.with(|active| active.borrow().contains(&ptr))
    }
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        IN_PIPELINE.with(|active| {
            active.borrow_mut().pop();
        });
    }
}
