//! SimpleTracker CLI - push records to a collector from the command line.
//!
//! # Commands
//!
//! - `simple-tracker push`: Read JSON lines from stdin and push each one
//! - `simple-tracker session`: Print the persisted session identifier
//!
//! # Environment Variables
//!
//! See the [`config`](simple_tracker::config) module for available settings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use simple_tracker::config::Settings;
use simple_tracker::{
    Dispatch, FileCookieJar, HttpTransport, SessionStore, StaticEnvironment, Tracker, TrackerSlot,
};

/// How long to wait for in-flight requests before exiting.
const SHUTDOWN_GRACE_MS: u64 = 500;

/// SimpleTracker - fire-and-forget event capture.
#[derive(Parser, Debug)]
#[command(name = "simple-tracker")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    SIMPLE_TRACKER_ENDPOINT        Collector URL (required for 'push')
    SIMPLE_TRACKER_DEV_MODE        Log records instead of sending (default: false)
    SIMPLE_TRACKER_ATTACH_CONTEXT  Attach client context (default: true)
    SIMPLE_TRACKER_CAPTURE_PANICS  Report panics as exceptions (default: true)
    SIMPLE_TRACKER_COOKIE_PATH     Cookie jar file (default: <data dir>/simple-tracker/cookies)
    SIMPLE_TRACKER_LOCATION        URL reported in the client context

EXAMPLES:
    # Push two records
    printf '{\"event\":\"deploy\"}\\nrelease finished\\n' | simple-tracker push

    # Inspect what would be sent
    SIMPLE_TRACKER_DEV_MODE=1 RUST_LOG=debug simple-tracker push < events.jsonl
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Push records read from stdin, one per line.
    ///
    /// Lines that parse as JSON are pushed as-is (objects may carry
    /// directives); other lines are pushed as text.
    Push {
        /// Override the session identifier.
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Print the persisted session identifier.
    Session {
        /// Cookie jar file (default: SIMPLE_TRACKER_COOKIE_PATH or the data dir).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Session { path } => run_session(path),
        Command::Push { session } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_push(session))
        }
    }
}

/// Prints the persisted session identifier, if any.
fn run_session(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => Settings::from_env()
            .context("Failed to load settings")?
            .cookie_path,
    };

    let store = SessionStore::new(Arc::new(FileCookieJar::new(&path)));
    let Some(id) = store.read_persisted() else {
        bail!("No session persisted at {}", path.display());
    };
    println!("{id}");

    Ok(())
}

/// Pushes stdin lines through a tracker configured from the environment.
async fn run_push(session: Option<String>) -> Result<()> {
    init_logging();

    let settings = Settings::from_env().context("Failed to load settings")?;

    info!(
        endpoint = %settings.endpoint,
        dev_mode = settings.dev_mode,
        cookie_path = %settings.cookie_path.display(),
        "Settings loaded"
    );

    let environment = match &settings.location {
        Some(location) => StaticEnvironment::new(location.clone()),
        None => StaticEnvironment::for_process(),
    };
    let transport = HttpTransport::new()
        .context("Failed to create HTTP transport")?
        .with_runtime(Handle::current());
    // Directives are queued first so they apply before any stdin record.
    // `sendCaughtExceptions` wires panics into the tracker when enabled.
    let mut slot = TrackerSlot::default();
    slot.push(Value::Object(settings.initial_patch().to_directives()));
    if let Some(session) = session {
        slot.push(json!({ "sessionId": session }));
    }

    let tracker = slot
        .bootstrap(
            Tracker::builder()
                .cookie_jar(Arc::new(FileCookieJar::new(&settings.cookie_path)))
                .environment(Arc::new(environment))
                .transport(Arc::new(transport)),
        )
        .context("Failed to initialize tracker")?;

    info!(
        session_id = tracker.session_id().as_deref().unwrap_or("<none>"),
        "Tracker ready"
    );

    let mut counts = PushCounts::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let data = serde_json::from_str::<Value>(line)
            .unwrap_or_else(|_| Value::String(line.to_string()));
        counts.record(&tracker.push(data));
    }

    info!(
        sent = counts.sent,
        logged = counts.logged,
        skipped = counts.skipped,
        discarded = counts.discarded,
        "Input exhausted"
    );

    if counts.discarded > 0 {
        warn!(
            discarded = counts.discarded,
            "Some lines were neither objects nor strings"
        );
    }

    // Sends are fire-and-forget; give in-flight requests a moment.
    tokio::time::sleep(Duration::from_millis(SHUTDOWN_GRACE_MS)).await;

    Ok(())
}

/// Tally of pipeline outcomes.
#[derive(Debug, Default)]
struct PushCounts {
    sent: usize,
    logged: usize,
    skipped: usize,
    discarded: usize,
}

impl PushCounts {
    fn record(&mut self, dispatch: &Dispatch) {
        match dispatch {
            Dispatch::Sent(_) => self.sent += 1,
            Dispatch::Logged(_) => self.logged += 1,
            Dispatch::Skipped => self.skipped += 1,
            Dispatch::Discarded => self.discarded += 1,
        }
    }
}

/// Initializes the tracing subscriber with environment-based filtering.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_tracker::{CookieJar, SESSION_KEY};
    use tempfile::TempDir;

    #[test]
    fn test_session_without_persisted_id_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies");

        let err = run_session(Some(path.clone())).unwrap_err();
        assert!(err.to_string().contains("No session persisted"));
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn test_session_with_persisted_id_succeeds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies");
        FileCookieJar::new(&path).set(SESSION_KEY, "abc").unwrap();

        assert!(run_session(Some(path)).is_ok());
    }
}
