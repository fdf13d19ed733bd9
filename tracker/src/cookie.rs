//! Cookie-equivalent persistent key-value store.
//!
//! The tracker keeps exactly one piece of persistent state, the session
//! identifier. It lives in a [`CookieJar`], which mirrors the semantics of a
//! browser's `document.cookie`: reads return the raw `key=value; key=value`
//! string, writes set (or replace) a single key.
//!
//! Two jars are provided:
//!
//! - [`MemoryCookieJar`]: in-process storage. Cloning shares the underlying
//!   jar, so two tracker instances built from clones behave like two page
//!   loads against the same browser profile.
//! - [`FileCookieJar`]: the raw cookie string stored in a single file, which
//!   survives process restarts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Separator between cookie pairs in the raw cookie string.
const PAIR_SEPARATOR: char = ';';

/// Errors that can occur while reading or writing a cookie jar.
#[derive(Error, Debug)]
pub enum CookieError {
    /// Reading or writing the backing file failed.
    #[error("cookie jar I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persistent, origin-scoped key-value storage.
pub trait CookieJar: Send + Sync {
    /// Returns the raw cookie string (`key=value; key=value`).
    ///
    /// # Errors
    ///
    /// Returns [`CookieError`] if the backing storage cannot be read.
    fn raw(&self) -> Result<String, CookieError>;

    /// Sets `key` to `value`, replacing any existing pair with the same key.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError`] if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), CookieError>;
}

/// Finds `key` in a raw cookie string and returns its value.
///
/// The value runs from just after `key=` up to the next `;` or the end of the
/// string.
#[must_use]
pub fn find_value<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    raw.split(PAIR_SEPARATOR).find_map(|pair| {
        let (name, value) = pair.trim_start().split_once('=')?;
        (name == key).then_some(value)
    })
}

/// Returns `raw` with `key` set to `value`, preserving the order of other pairs.
fn upsert(raw: &str, key: &str, value: &str) -> String {
    let mut pairs: Vec<String> = Vec::new();
    let mut replaced = false;

    for pair in raw.split(PAIR_SEPARATOR) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let name = pair.split_once('=').map_or(pair, |(name, _)| name);
        if name == key {
            if !replaced {
                pairs.push(format!("{key}={value}"));
                replaced = true;
            }
        } else {
            pairs.push(pair.to_string());
        }
    }

    if !replaced {
        pairs.push(format!("{key}={value}"));
    }

    pairs.join("; ")
}

/// In-memory cookie jar. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    raw: Arc<Mutex<String>>,
}

impl MemoryCookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar pre-populated with a raw cookie string.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Arc::new(Mutex::new(raw.into())),
        }
    }
}

impl CookieJar for MemoryCookieJar {
    fn raw(&self) -> Result<String, CookieError> {
        Ok(self
            .raw
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CookieError> {
        let mut raw = self.raw.lock().unwrap_or_else(PoisonError::into_inner);
        *raw = upsert(&raw, key, value);
        Ok(())
    }
}

/// Cookie jar persisted as a single file holding the raw cookie string.
///
/// A missing file reads as an empty jar. Parent directories are created on
/// first write.
#[derive(Debug, Clone)]
pub struct FileCookieJar {
    path: PathBuf,
}

impl FileCookieJar {
    /// Creates a jar backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> CookieError {
        CookieError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CookieJar for FileCookieJar {
    fn raw(&self) -> Result<String, CookieError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.trim_end().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CookieError> {
        let updated = upsert(&self.raw()?, key, value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        fs::write(&self.path, updated).map_err(|e| self.io_error(e))
    }
}
