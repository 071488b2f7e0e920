//! Shared HTTP plumbing for provider calls.

use std::time::Duration;

use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Builds the HTTP client used for every outbound provider call.
///
/// A timeout on any request surfaces as a `Network` error.
pub fn build_http_client(timeout: Duration) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("calfuse/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            ProviderError::configuration(format!("failed to create HTTP client: {e}")).with_source(e)
        })
}

/// Maps a transport failure onto a `Network` error.
pub(crate) fn transport_error(what: &str, err: reqwest::Error) -> ProviderError {
    let message = if err.is_timeout() {
        format!("{what}: request timed out")
    } else if err.is_connect() {
        format!("{what}: connection failed")
    } else {
        format!("{what}: request failed")
    };
    debug!(error = %err, "{}", message);
    ProviderError::network(message).with_source(err)
}

/// Reads a response body, mapping read failures onto `Network`.
pub(crate) async fn read_body(what: &str, response: reqwest::Response) -> ProviderResult<String> {
    response.text().await.map_err(|e| transport_error(what, e))
}
