//! RawProviderEvent to UnifiedEvent conversion.
//!
//! [`normalize`] dispatches on the provider id to that provider's field
//! mapping. It is a pure function: no I/O, and the same input always yields
//! the same output. [`normalize_all`] applies it to a batch, keeping input
//! order and failing on the first malformed event instead of dropping it.

use calfuse_core::{ProviderId, UnifiedEvent};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{ProviderError, ProviderResult};
use crate::raw_event::RawProviderEvent;
use crate::{google, outlook};

/// Converts one provider event into a [`UnifiedEvent`].
///
/// # Errors
///
/// Returns a `Normalization` error naming the offending field when a
/// required field is missing or a timestamp cannot be parsed.
pub fn normalize(provider: ProviderId, raw: &RawProviderEvent) -> ProviderResult<UnifiedEvent> {
    let result = match provider {
        ProviderId::Google => google::normalize(raw),
        ProviderId::Outlook => outlook::normalize(raw),
    };
    result.map_err(|e| e.with_provider(provider))
}

/// Converts a batch of provider events, preserving order and length.
///
/// Stops at the first event that fails; the error message names its index.
pub fn normalize_all(
    provider: ProviderId,
    raws: &[RawProviderEvent],
) -> ProviderResult<Vec<UnifiedEvent>> {
    raws.iter()
        .enumerate()
        .map(|(index, raw)| {
            normalize(provider, raw).map_err(|e| e.context(format!("event #{index}")))
        })
        .collect()
}

/// Reads a string at `path`; missing, non-string and empty values are `None`.
pub(crate) fn optional_str(raw: &RawProviderEvent, path: &str) -> Option<String> {
    raw.get(path)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Reads a string at `path`, failing if it is absent or empty.
pub(crate) fn required_str(raw: &RawProviderEvent, path: &str) -> ProviderResult<String> {
    optional_str(raw, path)
        .ok_or_else(|| ProviderError::normalization(path, "missing required field"))
}

/// Parses an RFC 3339 timestamp, naming `field` on failure.
pub(crate) fn parse_rfc3339(field: &str, value: &str) -> ProviderResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProviderError::normalization(field, "invalid RFC 3339 timestamp").with_source(e))
}

/// Formats a query bound the way both providers accept it (`2025-03-15T10:00:00Z`).
pub(crate) fn format_query_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
