//! Event listing against the provider's calendar API.

use std::sync::Arc;

use calfuse_core::{ProviderId, TimeWindow};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{read_body, transport_error};
use crate::raw_event::RawProviderEvent;
use crate::registry::ProviderRegistry;
use crate::{google, outlook};

/// Default number of events requested from a provider.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Options controlling an event listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Time range to list; `None` means from now onward.
    pub window: Option<TimeWindow>,
    /// Maximum number of events to return.
    pub max_results: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            window: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the listing to `window`.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Sets the maximum number of events. Zero is raised to one.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

/// Lists events with a bearer token. First page only, no retries.
#[derive(Debug, Clone)]
pub struct EventFetcher {
    registry: Arc<ProviderRegistry>,
    http: reqwest::Client,
}

impl EventFetcher {
    pub fn new(registry: Arc<ProviderRegistry>, http: reqwest::Client) -> Self {
        Self { registry, http }
    }

    /// Fetches raw events for `provider`.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` on HTTP 401; the token is not refreshed
    /// - `Upstream` for any other non-2xx response
    /// - `Network` for transport failures and timeouts
    /// - `MalformedResponse` if the body is not JSON or lacks the event list
    pub async fn fetch_events(
        &self,
        provider: ProviderId,
        access_token: &str,
        options: &FetchOptions,
    ) -> ProviderResult<Vec<RawProviderEvent>> {
        let config = self.registry.get(provider)?;
        let window = options.window.unwrap_or_else(TimeWindow::from_now);
        let max_results = options.max_results.max(1);

        let (query, list_field) = match provider {
            ProviderId::Google => (
                google::events_query(&window, max_results),
                google::LIST_FIELD,
            ),
            ProviderId::Outlook => (
                outlook::events_query(&window, max_results),
                outlook::LIST_FIELD,
            ),
        };

        let mut request = self
            .http
            .get(config.events_endpoint.clone())
            .bearer_auth(access_token)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .query(&query);
        if provider == ProviderId::Outlook {
            request = request.header("Prefer", HeaderValue::from_static(outlook::PREFER_UTC));
        }

        debug!(provider = %provider, endpoint = %config.events_endpoint, max_results, "fetching events");
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("event listing", e).with_provider(provider))?;

        let status = response.status();
        let body = read_body("event listing", response)
            .await
            .map_err(|e| e.with_provider(provider))?;

        if status == StatusCode::UNAUTHORIZED {
            warn!(provider = %provider, "access token rejected by events endpoint");
            return Err(
                ProviderError::unauthorized("access token was rejected").with_provider(provider)
            );
        }
        if !status.is_success() {
            return Err(ProviderError::upstream(
                format!("events endpoint returned {}", status.as_u16()),
                status.as_u16(),
                body,
            )
            .with_provider(provider));
        }

        let events = extract_events(provider, &body, list_field, max_results)?;
        info!(provider = %provider, count = events.len(), "fetched events");
        Ok(events)
    }
}

fn extract_events(
    provider: ProviderId,
    body: &str,
    list_field: &str,
    max_results: usize,
) -> ProviderResult<Vec<RawProviderEvent>> {
    let mut document: Value = serde_json::from_str(body).map_err(|e| {
        ProviderError::malformed_response("events response is not valid JSON")
            .with_provider(provider)
            .with_source(e)
    })?;

    let items = match document.get_mut(list_field).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(ProviderError::malformed_response(format!(
                "events response has no '{list_field}' array"
            ))
            .with_provider(provider));
        }
    };

    Ok(items
        .into_iter()
        .filter(|item| provider != ProviderId::Google || google::is_listable(item))
        .take(max_results)
        .map(RawProviderEvent::new)
        .collect())
}
