//! Microsoft Outlook (Graph) specifics: endpoints, calendarView query and field mapping.

use calfuse_core::{ProviderId, TimeWindow, UnifiedEvent};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::{ProviderError, ProviderResult};
use crate::normalize::{format_query_time, optional_str, required_str};
use crate::raw_event::RawProviderEvent;

pub(crate) const DEFAULT_TENANT: &str = "common";
pub(crate) const EVENTS_ENDPOINT: &str = "https://graph.microsoft.com/v1.0/me/calendarView";
pub(crate) const DEFAULT_SCOPES: &[&str] = &["offline_access", "Calendars.Read"];

/// JSON field holding the event array in a list response.
pub(crate) const LIST_FIELD: &str = "value";

/// `calendarView` needs an explicit end; open windows extend this far.
fn default_horizon() -> Duration {
    Duration::days(365)
}

/// Asks Graph to express every `dateTime` in UTC.
pub(crate) const PREFER_UTC: &str = "outlook.timezone=\"UTC\"";

pub(crate) fn auth_endpoint(tenant: &str) -> String {
    format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/authorize")
}

pub(crate) fn token_endpoint(tenant: &str) -> String {
    format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token")
}

pub(crate) fn extra_auth_params() -> Vec<(String, String)> {
    vec![("response_mode".to_string(), "query".to_string())]
}

/// Query parameters for `me/calendarView`.
pub(crate) fn events_query(window: &TimeWindow, max_results: usize) -> Vec<(&'static str, String)> {
    vec![
        ("startDateTime", format_query_time(window.start)),
        ("endDateTime", format_query_time(window.end_or(default_horizon()))),
        ("$top", max_results.to_string()),
        ("$orderby", "start/dateTime".to_string()),
    ]
}

/// Maps a Graph event resource onto a [`UnifiedEvent`].
///
/// | unified    | outlook                                |
/// |------------|----------------------------------------|
/// | id         | `id`                                   |
/// | title      | `subject`                              |
/// | start      | `start.dateTime` (+ `start.timeZone`)  |
/// | end        | `end.dateTime` (+ `end.timeZone`)      |
/// | all_day    | `isAllDay`                             |
/// | location   | `location.displayName`                 |
/// | html_link  | `webLink`                              |
pub(crate) fn normalize(raw: &RawProviderEvent) -> ProviderResult<UnifiedEvent> {
    let id = required_str(raw, "id")?;

    let start = event_time(raw, "start")?
        .ok_or_else(|| ProviderError::normalization("start.dateTime", "missing start time"))?;
    let end = event_time(raw, "end")?;

    let all_day = match raw.get("isAllDay") {
        None | Some(serde_json::Value::Null) => false,
        Some(value) => value
            .as_bool()
            .ok_or_else(|| ProviderError::normalization("isAllDay", "expected a boolean"))?,
    };

    Ok(UnifiedEvent::new(ProviderId::Outlook, id, start, raw.as_value().clone())
        .with_title(optional_str(raw, "subject"))
        .with_end(end)
        .with_all_day(all_day)
        .with_location(optional_str(raw, "location.displayName"))
        .with_html_link(optional_str(raw, "webLink")))
}

/// Parses `<key>.dateTime`, which Graph sends without an offset.
///
/// The value is read in `<key>.timeZone`; only UTC is accepted because the
/// fetcher asks Graph for UTC. Strings that carry an explicit offset are
/// accepted regardless of `timeZone`.
fn event_time(raw: &RawProviderEvent, key: &str) -> ProviderResult<Option<DateTime<Utc>>> {
    let field = format!("{key}.dateTime");
    let Some(value) = optional_str(raw, &field) else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    let tz_field = format!("{key}.timeZone");
    match optional_str(raw, &tz_field).as_deref() {
        None | Some("UTC") | Some("Etc/UTC") | Some("Coordinated Universal Time") => {}
        Some(other) => {
            return Err(ProviderError::normalization(
                tz_field.clone(),
                format!("unsupported time zone '{other}'"),
            ));
        }
    }

    NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| ProviderError::normalization(field, "invalid timestamp").with_source(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn timed_event() {
        let raw = RawProviderEvent::new(json!({
            "id": "AAMkAG=",
            "subject": "Planning",
            "start": {"dateTime": "2025-03-15T10:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2025-03-15T11:30:00.0000000", "timeZone": "UTC"},
            "isAllDay": false,
            "location": {"displayName": "Conf B"},
            "webLink": "https://outlook.office365.com/owa/?itemid=AAMkAG"
        }));

        let event = normalize(&raw).unwrap();
        assert_eq!(event.id, "AAMkAG=");
        assert_eq!(event.title.as_deref(), Some("Planning"));
        assert_eq!(event.start, Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap());
        assert_eq!(event.end, Some(Utc.with_ymd_and_hms(2025, 3, 15, 11, 30, 0).unwrap()));
        assert!(!event.all_day);
        assert_eq!(event.location.as_deref(), Some("Conf B"));
        assert_eq!(event.source, ProviderId::Outlook);
    }

    #[test]
    fn all_day_flag() {
        let raw = RawProviderEvent::new(json!({
            "id": "1",
            "subject": "Offsite",
            "start": {"dateTime": "2025-04-01T00:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2025-04-02T00:00:00.0000000", "timeZone": "UTC"},
            "isAllDay": true
        }));
        assert!(normalize(&raw).unwrap().all_day);
    }

    #[test]
    fn offset_timestamps_are_accepted() {
        let raw = RawProviderEvent::new(json!({
            "id": "1",
            "start": {"dateTime": "2025-03-15T10:00:00-05:00", "timeZone": "Eastern Standard Time"}
        }));
        let event = normalize(&raw).unwrap();
        assert_eq!(event.start, Utc.with_ymd_and_hms(2025, 3, 15, 15, 0, 0).unwrap());
        assert_eq!(event.title, None);
        assert_eq!(event.location, None);
    }

    #[test]
    fn non_utc_zone_without_offset_is_rejected() {
        let raw = RawProviderEvent::new(json!({
            "id": "1",
            "start": {"dateTime": "2025-03-15T10:00:00.0000000", "timeZone": "Pacific Standard Time"}
        }));
        assert_eq!(normalize(&raw).unwrap_err().field(), Some("start.timeZone"));
    }

    #[test]
    fn malformed_fields() {
        let raw = RawProviderEvent::new(json!({
            "id": "1",
            "start": {"dateTime": "15/03/2025 10:00", "timeZone": "UTC"}
        }));
        assert_eq!(normalize(&raw).unwrap_err().field(), Some("start.dateTime"));

        let raw = RawProviderEvent::new(json!({
            "id": "1",
            "start": {"dateTime": "2025-03-15T10:00:00", "timeZone": "UTC"},
            "isAllDay": "yes"
        }));
        assert_eq!(normalize(&raw).unwrap_err().field(), Some("isAllDay"));
    }

    #[test]
    fn query_always_has_both_bounds() {
        let start = Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap();
        let query = events_query(&TimeWindow::starting_at(start), 10);
        assert!(query.contains(&("startDateTime", "2025-03-15T10:00:00Z".to_string())));
        assert!(query.contains(&("endDateTime", "2026-03-15T10:00:00Z".to_string())));
        assert!(query.contains(&("$top", "10".to_string())));
    }

    #[test]
    fn tenant_endpoints() {
        assert_eq!(
            token_endpoint("common"),
            "https://login.microsoftonline.com/common/oauth2/v2.0/token"
        );
    }
}
