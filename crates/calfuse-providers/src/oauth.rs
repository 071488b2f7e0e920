//! OAuth 2.0 authorization code flow.
//!
//! [`AuthorizationFlowBuilder`] produces the consent URL and a fresh `state`;
//! [`TokenExchanger`] trades the code returned on the callback for a
//! [`TokenBundle`]. Neither keeps any state between calls; bookkeeping of
//! issued `state` values belongs to the caller.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use calfuse_core::ProviderId;
use chrono::{DateTime, Duration, Utc};
use rand::Rng as _;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{read_body, transport_error};
use crate::registry::{ProviderConfig, ProviderRegistry};

/// Bytes of entropy in a `state` value (128 bits).
const STATE_BYTES: usize = 16;

/// Generates an unguessable `state` value.
///
/// 16 bytes from the thread-local CSPRNG, base64url without padding.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compares two `state` values without short-circuiting on the first difference.
pub fn states_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// A consent URL together with the `state` it embeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationUrl {
    pub provider: ProviderId,
    pub url: Url,
    pub state: String,
    /// Scopes actually requested in `url`.
    pub scopes: Vec<String>,
}

/// Builds provider consent URLs. Performs no network I/O.
#[derive(Debug, Clone)]
pub struct AuthorizationFlowBuilder {
    registry: Arc<ProviderRegistry>,
}

impl AuthorizationFlowBuilder {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Builds the authorization URL for `provider`.
    ///
    /// `requested_scope` is narrowed to the configured scopes. When nothing
    /// survives the intersection (or nothing was requested) the full
    /// configured scope set is used.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProvider` if `provider` is not registered.
    pub fn build_auth_url(
        &self,
        provider: ProviderId,
        requested_scope: Option<&[String]>,
    ) -> ProviderResult<AuthorizationUrl> {
        let config = self.registry.get(provider)?;
        let scopes = resolve_scopes(config, requested_scope);
        let state = generate_state();

        let mut url = config.auth_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", config.redirect_uri.as_str())
                .append_pair("response_type", "code")
                .append_pair("scope", &scopes.join(" "))
                .append_pair("state", &state);
            for (key, value) in &config.extra_auth_params {
                query.append_pair(key, value);
            }
        }

        debug!(provider = %provider, scopes = ?scopes, "built authorization URL");
        Ok(AuthorizationUrl {
            provider,
            url,
            state,
            scopes,
        })
    }
}

/// Keeps configured order; drops requested scopes the provider is not configured for.
fn resolve_scopes(config: &ProviderConfig, requested: Option<&[String]>) -> Vec<String> {
    let narrowed: Vec<String> = match requested {
        Some(requested) => config
            .scopes
            .iter()
            .filter(|scope| requested.contains(scope))
            .cloned()
            .collect(),
        None => Vec::new(),
    };
    if narrowed.is_empty() {
        config.scopes.clone()
    } else {
        narrowed
    }
}

/// Tokens obtained from a code exchange. Lives for one request only.
#[derive(Clone)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl TokenBundle {
    fn from_response(response: TokenResponse, fallback_scopes: &[String]) -> Self {
        let expires_at = response.expires_in.and_then(expiry_from_now);
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => fallback_scopes.to_vec(),
        };
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            scopes,
        }
    }

}

/// Absolute expiry for an `expires_in` lifetime.
///
/// Negative or out-of-range lifetimes are treated as unknown.
fn expiry_from_now(secs: i64) -> Option<DateTime<Utc>> {
    if secs < 0 {
        return None;
    }
    Duration::try_seconds(secs).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Token endpoint response body.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Exchanges authorization codes for tokens.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    registry: Arc<ProviderRegistry>,
    http: reqwest::Client,
}

impl TokenExchanger {
    pub fn new(registry: Arc<ProviderRegistry>, http: reqwest::Client) -> Self {
        Self { registry, http }
    }

    /// Trades `code` for tokens at the provider's token endpoint.
    ///
    /// `state` is checked against `expected_state` before anything is sent.
    /// Sends exactly one request; nothing is retried.
    ///
    /// # Errors
    ///
    /// - `CsrfMismatch` if the states differ
    /// - `BadRequest` if `code` is empty
    /// - `Upstream` for a non-2xx response (status and body are kept for diagnostics)
    /// - `Network` for transport failures and timeouts
    /// - `MalformedResponse` if the body lacks an `access_token`
    pub async fn exchange(
        &self,
        provider: ProviderId,
        code: &str,
        state: &str,
        expected_state: &str,
    ) -> ProviderResult<TokenBundle> {
        let config = self.registry.get(provider)?;

        if !states_match(state, expected_state) {
            return Err(ProviderError::csrf_mismatch("state does not match the issued request")
                .with_provider(provider));
        }
        if code.trim().is_empty() {
            return Err(
                ProviderError::bad_request("authorization code is empty").with_provider(provider)
            );
        }

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];

        debug!(provider = %provider, endpoint = %config.token_endpoint, "exchanging authorization code");
        let response = self
            .http
            .post(config.token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error("token exchange", e).with_provider(provider))?;

        let status = response.status();
        let body = read_body("token exchange", response)
            .await
            .map_err(|e| e.with_provider(provider))?;

        if !status.is_success() {
            return Err(ProviderError::upstream(
                format!("token endpoint returned {}", status.as_u16()),
                status.as_u16(),
                body,
            )
            .with_provider(provider));
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::malformed_response("token response lacks a usable access_token")
                .with_provider(provider)
                .with_source(e)
        })?;
        if token_response.access_token.is_empty() {
            return Err(ProviderError::malformed_response("token response has an empty access_token")
                .with_provider(provider));
        }

        info!(provider = %provider, "obtained access token");
        Ok(TokenBundle::from_response(token_response, &config.scopes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration as StdDuration;

    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::ProviderErrorCode;
    use crate::http::build_http_client;

    fn google_config(token_endpoint: &str) -> ProviderConfig {
        ProviderConfig::google("client-123", "s3cret", "http://localhost:8080/google-callback")
            .unwrap()
            .with_token_endpoint(Url::parse(token_endpoint).unwrap())
    }

    fn registry_with(config: ProviderConfig) -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::new([config]).unwrap())
    }

    fn exchanger(registry: Arc<ProviderRegistry>) -> TokenExchanger {
        TokenExchanger::new(registry, build_http_client(StdDuration::from_secs(5)).unwrap())
    }

    #[test]
    fn state_is_22_url_safe_chars() {
        let state = generate_state();
        assert_eq!(state.len(), 22);
        assert!(
            state
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn states_are_unique() {
        let states: HashSet<String> = (0..10_000).map(|_| generate_state()).collect();
        assert_eq!(states.len(), 10_000);
    }

    #[test]
    fn state_comparison() {
        assert!(states_match("abc", "abc"));
        assert!(!states_match("abc", "abd"));
        assert!(!states_match("abc", "abcd"));
        assert!(!states_match("", "a"));
    }

    #[test]
    fn auth_url_contains_oauth_params() {
        let registry = registry_with(google_config("https://oauth2.googleapis.com/token"));
        let auth = AuthorizationFlowBuilder::new(registry)
            .build_auth_url(ProviderId::Google, None)
            .unwrap();

        assert_eq!(auth.url.host_str(), Some("accounts.google.com"));
        let pairs: Vec<(String, String)> = auth.url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("client_id"), Some("client-123"));
        assert_eq!(get("redirect_uri"), Some("http://localhost:8080/google-callback"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(
            get("scope"),
            Some("https://www.googleapis.com/auth/calendar.readonly")
        );
        assert_eq!(get("state"), Some(auth.state.as_str()));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("prompt"), Some("consent"));
        assert!(!auth.url.as_str().contains("s3cret"));
    }

    #[test]
    fn auth_url_unknown_provider() {
        let registry = registry_with(google_config("https://oauth2.googleapis.com/token"));
        let err = AuthorizationFlowBuilder::new(registry)
            .build_auth_url(ProviderId::Outlook, None)
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::UnknownProvider);
    }

    #[test]
    fn requested_scope_is_intersected() {
        let config = google_config("https://oauth2.googleapis.com/token")
            .with_scopes(["calendar.readonly", "calendar.events.readonly"]);
        let builder = AuthorizationFlowBuilder::new(registry_with(config));

        let requested = vec!["calendar.events.readonly".to_string(), "drive".to_string()];
        let auth = builder
            .build_auth_url(ProviderId::Google, Some(&requested))
            .unwrap();
        assert_eq!(auth.scopes, vec!["calendar.events.readonly"]);

        let unrelated = vec!["drive".to_string()];
        let auth = builder
            .build_auth_url(ProviderId::Google, Some(&unrelated))
            .unwrap();
        assert_eq!(auth.scopes, vec!["calendar.readonly", "calendar.events.readonly"]);
    }

    #[test]
    fn token_bundle_debug_redacts() {
        let bundle = TokenBundle {
            access_token: "ya29.secret".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: None,
            scopes: vec![],
        };
        let debug = format!("{bundle:?}");
        assert!(!debug.contains("ya29.secret"));
        assert!(!debug.contains("1//refresh"));
    }

    #[tokio::test]
    async fn exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/calendar.readonly",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registry = registry_with(google_config(&format!("{}/token", server.uri())));
        let bundle = exchanger(registry)
            .exchange(ProviderId::Google, "auth-code", "st", "st")
            .await
            .unwrap();

        assert_eq!(bundle.access_token, "ya29.token");
        assert_eq!(bundle.refresh_token.as_deref(), Some("1//refresh"));
        let expires_at = bundle.expires_at.unwrap();
        assert!(expires_at > Utc::now() + Duration::minutes(59));
        assert_eq!(
            bundle.scopes,
            vec!["https://www.googleapis.com/auth/calendar.readonly"]
        );
    }

    #[test]
    fn expiry_ignores_unusable_lifetimes() {
        assert!(expiry_from_now(0).is_some());
        assert!(expiry_from_now(-1).is_none());
        assert!(expiry_from_now(i64::MAX).is_none());
        assert!(expiry_from_now(i64::MAX / 1_000).is_none());
    }

    #[tokio::test]
    async fn exchange_with_huge_expires_in_has_no_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "t",
                "expires_in": i64::MAX
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registry = registry_with(google_config(&format!("{}/token", server.uri())));
        let bundle = exchanger(registry)
            .exchange(ProviderId::Google, "code", "st", "st")
            .await
            .unwrap();
        assert_eq!(bundle.access_token, "t");
        assert_eq!(bundle.expires_at, None);
    }

    #[tokio::test]
    async fn exchange_state_mismatch_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ex = exchanger(registry_with(google_config(&format!("{}/token", server.uri()))));
        let err = ex
            .exchange(ProviderId::Google, "code", "forged", "issued")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::CsrfMismatch);

        let err = ex
            .exchange(ProviderId::Google, "  ", "issued", "issued")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn exchange_upstream_error_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = exchanger(registry_with(google_config(&format!("{}/token", server.uri()))))
            .exchange(ProviderId::Google, "stale", "st", "st")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Upstream);
        assert_eq!(err.upstream_status(), Some(400));
        assert_eq!(err.upstream_body(), Some(r#"{"error":"invalid_grant"}"#));
        assert!(!err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn exchange_without_access_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let err = exchanger(registry_with(google_config(&format!("{}/token", server.uri()))))
            .exchange(ProviderId::Google, "code", "st", "st")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::MalformedResponse);
        assert_eq!(err.provider(), Some(ProviderId::Google));
    }

    #[tokio::test]
    async fn exchange_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(StdDuration::from_secs(2))
                    .set_body_json(serde_json::json!({"access_token": "late"})),
            )
            .mount(&server)
            .await;

        let registry = registry_with(google_config(&format!("{}/token", server.uri())));
        let ex = TokenExchanger::new(
            registry,
            build_http_client(StdDuration::from_millis(200)).unwrap(),
        );
        let err = ex
            .exchange(ProviderId::Google, "code", "st", "st")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Network);
    }
}
