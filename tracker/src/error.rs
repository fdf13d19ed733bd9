//! Error types for SimpleTracker.
//!
//! Tracking itself never fails from the caller's point of view: malformed
//! input, timer misuse and delivery failures are logged and swallowed. The
//! errors here cover setup: building a transport, loading settings, and
//! direct use of a cookie jar.

use thiserror::Error;

use crate::config::ConfigError;
use crate::cookie::CookieError;
use crate::transport::TransportError;

/// Errors that can occur while setting up a tracker.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport setup error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Cookie jar error.
    #[error("cookie error: {0}")]
    Cookie(#[from] CookieError),
}

/// A specialized `Result` type for tracker setup.
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn config_error_to_tracker_error_conversion() {
        let err: TrackerError =
            ConfigError::MissingEnvVar("SIMPLE_TRACKER_ENDPOINT".to_string()).into();
        assert!(matches!(err, TrackerError::Config(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: missing required environment variable: SIMPLE_TRACKER_ENDPOINT"
        );
    }

    #[test]
    fn cookie_error_display_and_source() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: TrackerError = CookieError::Io {
            path: PathBuf::from("/tmp/cookies"),
            source: io_err,
        }
        .into();

        assert_eq!(
            err.to_string(),
            "cookie error: cookie jar I/O error at /tmp/cookies: access denied"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn result_type_alias_works() {
        fn example_function() -> Result<i32> {
            Ok(42)
        }

        fn example_error_function() -> Result<i32> {
            Err(ConfigError::NoDataDirectory.into())
        }

        assert!(example_function().is_ok());
        assert!(example_error_function().is_err());
    }
}
