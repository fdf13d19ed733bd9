//! Timer registry for duration metrics.
//!
//! Timers are keyed by metric name and hold the monotonic start time in
//! milliseconds. A completed start/stop pair yields the rounded elapsed time,
//! which the tracker emits as a metric record.
//!
//! Clock handling is deliberately asymmetric: starting without a clock is
//! reported as an error (the tracker warns), while stopping without a clock
//! is a silent no-op.

use std::collections::HashMap;

use thiserror::Error;

/// Errors reported by the timer registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The host has no monotonic clock.
    #[error("monotonic clock is not available")]
    ClockUnavailable,

    /// `stop` was called for a metric that was never started.
    #[error("Timing metric '{0}' wasn't started")]
    NotStarted(String),
}

/// Result of a successful [`TimerRegistry::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStart {
    /// The timer was idle and is now running.
    Started,
    /// The timer was already running; its start time was overwritten.
    Restarted,
}

/// Mapping of metric name to start time.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    started: HashMap<String, f64>,
}

impl TimerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the timer for `metric` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::ClockUnavailable`] if `now` is `None`; the
    /// registry is left untouched.
    pub fn start(&mut self, metric: &str, now: Option<f64>) -> Result<TimerStart, TimerError> {
        let now = now.ok_or(TimerError::ClockUnavailable)?;

        match self.started.insert(metric.to_string(), now) {
            Some(_) => Ok(TimerStart::Restarted),
            None => Ok(TimerStart::Started),
        }
    }

    /// Stops the timer for `metric` at `now` and returns the elapsed
    /// milliseconds, rounded to the nearest integer.
    ///
    /// Returns `Ok(None)` without touching the registry if `now` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NotStarted`] if no timer is running for `metric`.
    pub fn stop(&mut self, metric: &str, now: Option<f64>) -> Result<Option<u64>, TimerError> {
        let Some(now) = now else {
            return Ok(None);
        };

        let start = self
            .started
            .remove(metric)
            .ok_or_else(|| TimerError::NotStarted(metric.to_string()))?;

        // A clock can only go backwards through host bugs; report zero.
        Ok(Some((now - start).round().max(0.0) as u64))
    }

    /// Returns true if a timer is running for `metric`.
    #[must_use]
    pub fn is_running(&self, metric: &str) -> bool {
        self.started.contains_key(metric)
    }

    /// Number of running timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.started.len()
    }

    /// Returns true if no timers are running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
    }
}
