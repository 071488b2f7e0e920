//! Time windows for event queries.
//!
//! A [`TimeWindow`] is a half-open interval `[start, end)` in UTC. The end
//! may be left open, which means "from `start` onward".

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A time range used to restrict event listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive), or `None` for an open-ended window.
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Creates a bounded time window.
    ///
    /// Returns `None` if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self {
            start,
            end: Some(end),
        })
    }

    /// Creates an open-ended window starting at `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    /// Creates an open-ended window starting now.
    pub fn from_now() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Returns the end bound, substituting `start + horizon` when open-ended.
    pub fn end_or(&self, horizon: Duration) -> DateTime<Utc> {
        self.end.unwrap_or(self.start + horizon)
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::from_now()
    }
}
