//! Settings for the `simple-tracker` binary.
//!
//! This module handles parsing settings from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SIMPLE_TRACKER_ENDPOINT` | Yes | - | Collector URL |
//! | `SIMPLE_TRACKER_DEV_MODE` | No | `false` | Log records instead of sending |
//! | `SIMPLE_TRACKER_ATTACH_CONTEXT` | No | `true` | Attach the client context |
//! | `SIMPLE_TRACKER_CAPTURE_PANICS` | No | `true` | Report panics as exceptions |
//! | `SIMPLE_TRACKER_COOKIE_PATH` | No | `<data dir>/simple-tracker/cookies` | Cookie jar file |
//! | `SIMPLE_TRACKER_LOCATION` | No | `file://<cwd>` | URL reported in the client context |
//!
//! Boolean variables accept `true`/`false`, `1`/`0`, `yes`/`no` and
//! `on`/`off`, case-insensitively.
//!
//! # Example
//!
//! ```no_run
//! use simple_tracker::config::Settings;
//!
//! let settings = Settings::from_env().expect("Failed to load settings");
//! println!("Endpoint: {}", settings.endpoint);
//! ```

use std::env;
use std::path::PathBuf;

use directories::BaseDirs;
use thiserror::Error;

use crate::record::ConfigPatch;

/// Directory under the user data dir holding the default cookie jar.
const DEFAULT_DATA_DIR: &str = "simple-tracker";

/// Default cookie jar file name.
const DEFAULT_COOKIE_FILE: &str = "cookies";

/// Errors that can occur during settings parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine the user data directory.
    #[error("failed to determine data directory")]
    NoDataDirectory,
}

/// Settings for a tracker driven by the binary.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Collector URL.
    pub endpoint: String,

    /// Log records instead of sending them.
    pub dev_mode: bool,

    /// Attach the client context to records.
    pub attach_client_context: bool,

    /// Report panics through the tracker.
    pub capture_panics: bool,

    /// File backing the cookie jar.
    pub cookie_path: PathBuf,

    /// URL reported in the client context. `None` uses the working directory.
    pub location: Option<String>,
}

impl Settings {
    /// Creates new `Settings` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `SIMPLE_TRACKER_ENDPOINT` is not set or empty
    /// - a boolean variable has an unrecognized value
    /// - `SIMPLE_TRACKER_COOKIE_PATH` is unset and no data directory exists
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: SIMPLE_TRACKER_ENDPOINT
        let endpoint = env::var("SIMPLE_TRACKER_ENDPOINT")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SIMPLE_TRACKER_ENDPOINT".to_string()))?;

        let dev_mode = parse_bool_var("SIMPLE_TRACKER_DEV_MODE", false)?;
        let attach_client_context = parse_bool_var("SIMPLE_TRACKER_ATTACH_CONTEXT", true)?;
        let capture_panics = parse_bool_var("SIMPLE_TRACKER_CAPTURE_PANICS", true)?;

        // Optional: SIMPLE_TRACKER_COOKIE_PATH (default: <data dir>/simple-tracker/cookies)
        let cookie_path = match env::var("SIMPLE_TRACKER_COOKIE_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_cookie_path()?,
        };

        let location = env::var("SIMPLE_TRACKER_LOCATION")
            .ok()
            .filter(|val| !val.is_empty());

        Ok(Self {
            endpoint,
            dev_mode,
            attach_client_context,
            capture_panics,
            cookie_path,
            location,
        })
    }

    /// Renders the settings as the directives a tracker is configured with.
    #[must_use]
    pub fn initial_patch(&self) -> ConfigPatch {
        ConfigPatch {
            dev_mode: Some(self.dev_mode),
            attach_client_context: Some(self.attach_client_context),
            session_id: None,
            endpoint: Some(self.endpoint.clone()),
            send_caught_exceptions: Some(self.capture_panics),
        }
    }
}

/// Returns the default cookie jar location.
fn default_cookie_path() -> Result<PathBuf, ConfigError> {
    let base_dirs = BaseDirs::new().ok_or(ConfigError::NoDataDirectory)?;
    Ok(base_dirs
        .data_dir()
        .join(DEFAULT_DATA_DIR)
        .join(DEFAULT_COOKIE_FILE))
}

/// Reads a boolean environment variable, falling back to `default` when unset.
fn parse_bool_var(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(val) => parse_bool(&val).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{val}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
