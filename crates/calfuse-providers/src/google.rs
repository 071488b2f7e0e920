//! Google Calendar specifics: endpoints, event query and field mapping.

use calfuse_core::{ProviderId, TimeWindow, UnifiedEvent};
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{ProviderError, ProviderResult};
use crate::normalize::{format_query_time, optional_str, parse_rfc3339, required_str};
use crate::raw_event::RawProviderEvent;

pub(crate) const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub(crate) const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub(crate) const EVENTS_ENDPOINT: &str =
    "https://www.googleapis.com/calendar/v3/calendars/primary/events";
pub(crate) const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar.readonly"];

/// JSON field holding the event array in a list response.
pub(crate) const LIST_FIELD: &str = "items";

/// Ask for a refresh token and force the consent screen so one is always issued.
pub(crate) fn extra_auth_params() -> Vec<(String, String)> {
    vec![
        ("access_type".to_string(), "offline".to_string()),
        ("prompt".to_string(), "consent".to_string()),
    ]
}

/// Query parameters for `events.list`.
pub(crate) fn events_query(window: &TimeWindow, max_results: usize) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("timeMin", format_query_time(window.start)),
        ("maxResults", max_results.to_string()),
        ("singleEvents", "true".to_string()),
        ("orderBy", "startTime".to_string()),
    ];
    if let Some(end) = window.end {
        query.push(("timeMax", format_query_time(end)));
    }
    query
}

/// Cancelled instances are tombstones, not events.
pub(crate) fn is_listable(item: &serde_json::Value) -> bool {
    item.get("status").and_then(|s| s.as_str()) != Some("cancelled")
}

/// Maps a Google event resource onto a [`UnifiedEvent`].
///
/// | unified    | google                          |
/// |------------|---------------------------------|
/// | id         | `id`                            |
/// | title      | `summary`                       |
/// | start      | `start.dateTime` / `start.date` |
/// | end        | `end.dateTime` / `end.date`     |
/// | all_day    | `start.date` present            |
/// | location   | `location`                      |
/// | html_link  | `htmlLink`                      |
pub(crate) fn normalize(raw: &RawProviderEvent) -> ProviderResult<UnifiedEvent> {
    let id = required_str(raw, "id")?;

    let (start, all_day) = event_time(raw, "start")?
        .ok_or_else(|| ProviderError::normalization("start", "missing start time"))?;
    let end = event_time(raw, "end")?.map(|(end, _)| end);

    Ok(UnifiedEvent::new(ProviderId::Google, id, start, raw.as_value().clone())
        .with_title(optional_str(raw, "summary"))
        .with_end(end)
        .with_all_day(all_day)
        .with_location(optional_str(raw, "location"))
        .with_html_link(optional_str(raw, "htmlLink")))
}

/// Reads `<key>.dateTime` or `<key>.date`, returning the instant and whether it is all-day.
///
/// All-day dates are anchored at midnight UTC.
fn event_time(raw: &RawProviderEvent, key: &str) -> ProviderResult<Option<(DateTime<Utc>, bool)>> {
    let date_time_field = format!("{key}.dateTime");
    if let Some(value) = optional_str(raw, &date_time_field) {
        return parse_rfc3339(&date_time_field, &value).map(|dt| Some((dt, false)));
    }

    let date_field = format!("{key}.date");
    if let Some(value) = optional_str(raw, &date_field) {
        let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|e| {
            ProviderError::normalization(&date_field, "expected YYYY-MM-DD date").with_source(e)
        })?;
        let midnight = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()).ok_or_else(|| {
            ProviderError::normalization(&date_field, "date out of range")
        })?;
        return Ok(Some((midnight, true)));
    }

    Ok(None)
}
