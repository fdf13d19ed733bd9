//! Two-phase bootstrap.
//!
//! Hosts often want to record calls before the tracker exists (while
//! configuration is still loading, say). They do so through a
//! [`TrackerSlot`]: pushes into an empty slot are queued in a
//! [`PreloadQueue`], and [`bootstrap`] later replays the queue through a
//! fresh tracker, in order, exactly once. A slot that already holds a live
//! tracker is reused as-is so its accumulated configuration survives.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use simple_tracker::{Tracker, TrackerSlot};
//!
//! # fn main() -> simple_tracker::Result<()> {
//! let mut slot = TrackerSlot::default();
//! slot.push(json!({"endpoint": "https://collector.example.com/events"}));
//! slot.push("loading");
//!
//! let tracker = slot.bootstrap(Tracker::builder())?;
//! tracker.log_event("ready");
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::tracker::{Tracker, TrackerBuilder};

/// Pushes recorded before the tracker was created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreloadQueue {
    entries: Vec<Value>,
}

impl PreloadQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a push for later replay.
    pub fn push(&mut self, data: impl Into<Value>) {
        self.entries.push(data.into());
    }

    /// Number of recorded pushes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Into<Value>> FromIterator<V> for PreloadQueue {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Where a host keeps its tracker, before and after initialization.
#[derive(Debug, Default)]
pub enum TrackerSlot {
    /// Nothing recorded, no tracker yet.
    #[default]
    Empty,
    /// Pushes recorded before initialization.
    Queued(PreloadQueue),
    /// An initialized tracker.
    Live(Tracker),
}

impl TrackerSlot {
    /// Pushes into the slot: forwarded to a live tracker, queued otherwise.
    pub fn push(&mut self, data: impl Into<Value>) {
        match self {
            Self::Live(tracker) => {
                tracker.push(data);
            }
            Self::Queued(queue) => queue.push(data),
            Self::Empty => {
                let mut queue = PreloadQueue::new();
                queue.push(data);
                *self = Self::Queued(queue);
            }
        }
    }

    /// Returns the live tracker, if the slot has been bootstrapped.
    #[must_use]
    pub fn tracker(&self) -> Option<&Tracker> {
        match self {
            Self::Live(tracker) => Some(tracker),
            Self::Empty | Self::Queued(_) => None,
        }
    }

    /// Resolves the slot into a tracker and stores it back as
    /// [`TrackerSlot::Live`].
    ///
    /// # Errors
    ///
    /// Returns an error if a new tracker is needed and `builder` fails.
    pub fn bootstrap(&mut self, builder: TrackerBuilder) -> Result<Tracker> {
        let tracker = bootstrap(std::mem::take(self), builder)?;
        *self = Self::Live(tracker.clone());
        Ok(tracker)
    }
}

/// Resolves `slot` into a tracker.
///
/// - `Live`: the existing tracker is returned and `builder` is dropped.
/// - `Queued`: a new tracker is built and every queued push is replayed
///   through it in the order it was recorded.
/// - `Empty`: a new tracker is built.
///
/// # Errors
///
/// Returns an error if a new tracker is needed and `builder` fails.
pub fn bootstrap(slot: TrackerSlot, builder: TrackerBuilder) -> Result<Tracker> {
    match slot {
        TrackerSlot::Live(tracker) => {
            debug!("Reusing live tracker");
            Ok(tracker)
        }
        TrackerSlot::Queued(queue) => {
            let tracker = builder.build()?;
            debug!(queued = queue.len(), "Replaying preload queue");
            for entry in queue.entries {
                tracker.push(entry);
            }
            Ok(tracker)
        }
        TrackerSlot::Empty => builder.build(),
    }
}
