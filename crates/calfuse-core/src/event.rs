//! Event types shared by every calendar provider.
//!
//! This module provides:
//! - [`ProviderId`]: The closed set of supported calendar providers
//! - [`UnifiedEvent`]: The canonical, provider-independent event
//! - [`sort_events`]: The deterministic ordering applied before events leave the service

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A supported calendar provider.
///
/// The declaration order is significant: it is the tie-breaker used by
/// [`sort_events`] when two events start at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Google Calendar.
    Google,
    /// Microsoft Outlook via the Graph API.
    Outlook,
}

impl ProviderId {
    /// All supported providers.
    pub const ALL: [ProviderId; 2] = [ProviderId::Google, ProviderId::Outlook];

    /// Returns the lowercase wire name of this provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Outlook => "outlook",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a supported provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown calendar provider: {0}")]
pub struct UnknownProviderId(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProviderId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "outlook" => Ok(Self::Outlook),
            _ => Err(UnknownProviderId(s.to_string())),
        }
    }
}

/// A calendar event in the canonical representation.
///
/// `id` is only unique within `source`; use [`UnifiedEvent::global_key`]
/// when events from several providers are mixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEvent {
    /// Provider-assigned identifier.
    pub id: String,
    /// The event title, absent when the provider has none.
    pub title: Option<String>,
    /// When the event starts (UTC).
    pub start: DateTime<Utc>,
    /// When the event ends (UTC), if known.
    pub end: Option<DateTime<Utc>>,
    /// Whether this is an all-day event.
    pub all_day: bool,
    /// The provider this event came from.
    pub source: ProviderId,
    /// Free-form location text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Link to the event in the provider's web UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    /// The untouched provider payload.
    pub raw: serde_json::Value,
}

impl UnifiedEvent {
    /// Creates a new event with the required fields.
    pub fn new(
        source: ProviderId,
        id: impl Into<String>,
        start: DateTime<Utc>,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            title: None,
            start,
            end: None,
            all_day: false,
            source,
            location: None,
            html_link: None,
            raw,
        }
    }

    /// Returns a key that is unique across providers.
    pub fn global_key(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }

    /// Builder method to set the title.
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Builder method to set the end time.
    pub fn with_end(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.end = end;
        self
    }

    /// Builder method to mark the event as all-day.
    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    /// Builder method to set the web link.
    pub fn with_html_link(mut self, html_link: Option<String>) -> Self {
        self.html_link = html_link;
        self
    }

    /// Compares two events by `start`, then `source`, then `id`.
    pub fn display_order(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sorts events ascending by start time; ties break on source, then id.
pub fn sort_events(events: &mut [UnifiedEvent]) {
    events.sort_by(UnifiedEvent::display_order);
}
