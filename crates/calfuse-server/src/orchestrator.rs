//! Connection attempts from consent URL to normalized events.
//!
//! An attempt moves through
//! `Init -> AwaitingCallback -> Exchanging -> Fetching -> Normalizing -> Done`,
//! or stops in `Failed(kind)` from any non-terminal state. [`Orchestrator`]
//! drives both halves: [`Orchestrator::begin`] up to `AwaitingCallback`, and
//! [`Orchestrator::complete`] from the callback onward.

use std::fmt;
use std::sync::Arc;

use calfuse_core::{ProviderId, UnifiedEvent, sort_events};
use calfuse_protocol::{ErrorKind, ErrorResponse};
use calfuse_providers::{
    AuthorizationFlowBuilder, AuthorizationUrl, EventFetcher, FetchOptions, ProviderError,
    ProviderErrorCode, ProviderRegistry, TokenExchanger, build_http_client, normalize_all,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::pending::{PendingRequest, PendingTable, TakeError};

/// Where a connection attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    AwaitingCallback,
    Exchanging,
    Fetching,
    Normalizing,
    Done,
    /// Terminal failure, carrying only the error kind.
    Failed(ErrorKind),
}

impl ConnectionState {
    /// Returns true for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Returns true if `next` may directly follow `self`.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (s, Failed(_)) => !s.is_terminal(),
            (Init, AwaitingCallback)
            | (AwaitingCallback, Exchanging)
            | (Exchanging, Fetching)
            | (Fetching, Normalizing)
            | (Normalizing, Done) => true,
            _ => false,
        }
    }

    /// Moves to `next`, refusing edges the lifecycle does not allow.
    pub fn transition(self, next: ConnectionState) -> Result<Self, OrchestratorError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::AwaitingCallback => f.write_str("awaiting_callback"),
            Self::Exchanging => f.write_str("exchanging"),
            Self::Fetching => f.write_str("fetching"),
            Self::Normalizing => f.write_str("normalizing"),
            Self::Done => f.write_str("done"),
            Self::Failed(kind) => write!(f, "failed({})", kind_name(*kind)),
        }
    }
}

/// Errors surfaced by [`Orchestrator`]. The only type converted into an
/// [`ErrorResponse`] for API callers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("unknown or already used state")]
    UnknownState,

    #[error("authorization request for {provider} expired")]
    Expired { provider: ProviderId },

    #[error("state was issued for {actual}, not {expected}")]
    ProviderMismatch {
        expected: ProviderId,
        actual: ProviderId,
    },

    #[error("missing query parameter '{0}'")]
    MissingParameter(&'static str),

    /// `error` is the OAuth error code when it is one of the registered codes.
    #[error("{provider} denied authorization ({})", .error.unwrap_or("unrecognized error"))]
    Denied {
        provider: ProviderId,
        error: Option<&'static str>,
    },

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl OrchestratorError {
    /// The wire kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(err) => match err.code() {
                ProviderErrorCode::UnknownProvider => ErrorKind::UnknownProvider,
                ProviderErrorCode::CsrfMismatch => ErrorKind::CsrfMismatch,
                ProviderErrorCode::ExpiredRequest => ErrorKind::ExpiredRequest,
                ProviderErrorCode::Upstream => ErrorKind::ProviderError,
                ProviderErrorCode::Network => ErrorKind::NetworkError,
                ProviderErrorCode::MalformedResponse => ErrorKind::MalformedResponse,
                ProviderErrorCode::Unauthorized => ErrorKind::Unauthorized,
                ProviderErrorCode::Normalization => ErrorKind::NormalizationError,
                ProviderErrorCode::BadRequest => ErrorKind::BadRequest,
                ProviderErrorCode::Configuration => ErrorKind::InternalError,
            },
            Self::UnknownState | Self::ProviderMismatch { .. } => ErrorKind::CsrfMismatch,
            Self::Expired { .. } => ErrorKind::ExpiredRequest,
            Self::MissingParameter(_) => ErrorKind::BadRequest,
            Self::Denied { .. } => ErrorKind::ProviderError,
            Self::InvalidTransition { .. } => ErrorKind::InternalError,
        }
    }

    /// Converts into the body returned to API callers.
    ///
    /// The message is the kind's fixed user message, plus a detail only when
    /// that detail comes from a closed set (parameter and field names, OAuth
    /// error codes).
    pub fn to_response(&self) -> ErrorResponse {
        let kind = self.kind();
        match self.detail() {
            Some(detail) => ErrorResponse::with_detail(kind, detail),
            None => ErrorResponse::from_kind(kind),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::MissingParameter(name) => Some((*name).to_string()),
            Self::Denied {
                error: Some(code), ..
            } => Some((*code).to_string()),
            Self::Provider(err) if err.code() == ProviderErrorCode::Normalization => {
                err.field().map(|field| format!("field {field}"))
            }
            _ => None,
        }
    }
}

/// Authorization error codes a provider may send back on the callback.
const OAUTH_ERROR_CODES: &[&str] = &[
    "invalid_request",
    "unauthorized_client",
    "access_denied",
    "unsupported_response_type",
    "invalid_scope",
    "server_error",
    "temporarily_unavailable",
];

fn oauth_error_code(error: &str) -> Option<&'static str> {
    OAUTH_ERROR_CODES.iter().copied().find(|code| *code == error)
}

fn kind_name(kind: ErrorKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{kind:?}"))
}

/// Tracks one attempt's lifecycle for logging and edge checks.
struct Attempt {
    provider: ProviderId,
    state: ConnectionState,
}

impl Attempt {
    fn new(provider: ProviderId, state: ConnectionState) -> Self {
        Self { provider, state }
    }

    fn advance(&mut self, next: ConnectionState) -> Result<(), OrchestratorError> {
        let next = self.state.transition(next)?;
        debug!(provider = %self.provider, from = %self.state, to = %next, "attempt transition");
        self.state = next;
        Ok(())
    }

    /// Marks the attempt failed and hands the error back.
    fn fail(&mut self, err: OrchestratorError) -> OrchestratorError {
        let failed = ConnectionState::Failed(err.kind());
        if self.state.can_transition_to(failed) {
            warn!(provider = %self.provider, from = %self.state, error = %err, "attempt failed");
            self.state = failed;
        }
        err
    }
}

struct Inner {
    registry: Arc<ProviderRegistry>,
    flow: AuthorizationFlowBuilder,
    exchanger: TokenExchanger,
    fetcher: EventFetcher,
    fetch_options: FetchOptions,
    pending: Mutex<PendingTable>,
}

/// Runs connection attempts. Cheap to clone; clones share the pending table.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.inner.registry.providers())
            .field("fetch_options", &self.inner.fetch_options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with its own HTTP client.
    pub fn new(registry: Arc<ProviderRegistry>, config: &ServerConfig) -> ServerResult<Self> {
        let http = build_http_client(config.http_timeout)?;
        Ok(Self::with_http_client(registry, http, config))
    }

    /// Creates an orchestrator sharing an existing HTTP client.
    pub fn with_http_client(
        registry: Arc<ProviderRegistry>,
        http: reqwest::Client,
        config: &ServerConfig,
    ) -> Self {
        let inner = Inner {
            flow: AuthorizationFlowBuilder::new(registry.clone()),
            exchanger: TokenExchanger::new(registry.clone(), http.clone()),
            fetcher: EventFetcher::new(registry.clone(), http),
            fetch_options: FetchOptions::new().with_max_results(config.default_max_results),
            pending: Mutex::new(PendingTable::new(config.request_ttl)),
            registry,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Registered providers.
    pub fn providers(&self) -> Vec<ProviderId> {
        self.inner.registry.providers()
    }

    /// Number of pending entries, expired tombstones included.
    pub async fn pending_len(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// Starts an attempt: builds the consent URL and records its `state`.
    ///
    /// # Errors
    ///
    /// `UnknownProvider` if `provider_name` does not name a registered provider.
    pub async fn begin(
        &self,
        provider_name: &str,
        requested_scope: Option<&[String]>,
    ) -> Result<AuthorizationUrl, OrchestratorError> {
        let provider = self.inner.registry.get_by_name(provider_name)?.id;
        let mut attempt = Attempt::new(provider, ConnectionState::Init);

        let auth = self.inner.flow.build_auth_url(provider, requested_scope)?;
        {
            let mut pending = self.inner.pending.lock().await;
            pending.purge();
            pending.insert(provider, auth.state.clone(), auth.scopes.clone());
        }
        attempt.advance(ConnectionState::AwaitingCallback)?;

        info!(provider = %provider, "authorization started");
        Ok(auth)
    }

    /// Finishes an attempt from its callback and returns sorted events.
    ///
    /// The pending entry for `state` is consumed before anything else, so
    /// the same `state` never succeeds twice. `expected_provider` is set by
    /// provider-specific callback routes and must match the provider the
    /// `state` was issued for.
    pub async fn complete(
        &self,
        expected_provider: Option<ProviderId>,
        code: &str,
        state: &str,
    ) -> Result<Vec<UnifiedEvent>, OrchestratorError> {
        let request = self.take_pending(expected_provider, state).await?;
        let provider = request.provider;
        let mut attempt = Attempt::new(provider, ConnectionState::AwaitingCallback);

        attempt.advance(ConnectionState::Exchanging)?;
        let tokens = self
            .inner
            .exchanger
            .exchange(provider, code, state, &request.state)
            .await
            .map_err(|e| attempt.fail(e.into()))?;
        debug!(
            provider = %provider,
            scopes = ?tokens.scopes,
            expires_at = ?tokens.expires_at,
            "token issued"
        );

        attempt.advance(ConnectionState::Fetching)?;
        let raws = self
            .inner
            .fetcher
            .fetch_events(provider, &tokens.access_token, &self.inner.fetch_options)
            .await
            .map_err(|e| attempt.fail(e.into()))?;

        attempt.advance(ConnectionState::Normalizing)?;
        let mut events = normalize_all(provider, &raws).map_err(|e| attempt.fail(e.into()))?;
        sort_events(&mut events);

        attempt.advance(ConnectionState::Done)?;
        info!(provider = %provider, count = events.len(), "attempt completed");
        Ok(events)
    }

    /// Handles a callback carrying a provider `error` (e.g. `access_denied`).
    ///
    /// The `state` is consumed and the token endpoint is never contacted.
    pub async fn reject(
        &self,
        expected_provider: Option<ProviderId>,
        state: &str,
        error: &str,
    ) -> OrchestratorError {
        let request = match self.take_pending(expected_provider, state).await {
            Ok(request) => request,
            Err(err) => return err,
        };
        let mut attempt = Attempt::new(request.provider, ConnectionState::AwaitingCallback);
        attempt.fail(OrchestratorError::Denied {
            provider: request.provider,
            error: oauth_error_code(error),
        })
    }

    async fn take_pending(
        &self,
        expected_provider: Option<ProviderId>,
        state: &str,
    ) -> Result<PendingRequest, OrchestratorError> {
        if state.is_empty() {
            return Err(OrchestratorError::MissingParameter("state"));
        }
        let taken = self.inner.pending.lock().await.take(state);
        let request = match taken {
            Ok(request) => request,
            Err(TakeError::Unknown) => {
                warn!("callback with unknown or replayed state");
                return Err(OrchestratorError::UnknownState);
            }
            Err(TakeError::Expired { provider }) => {
                warn!(provider = %provider, "callback for expired request");
                return Err(OrchestratorError::Expired { provider });
            }
        };
        match expected_provider {
            Some(expected) if expected != request.provider => {
                warn!(expected = %expected, actual = %request.provider, "callback on wrong provider route");
                Err(OrchestratorError::ProviderMismatch {
                    expected,
                    actual: request.provider,
                })
            }
            _ => Ok(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use calfuse_providers::ProviderConfig;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry(server: &MockServer) -> Arc<ProviderRegistry> {
        let google = ProviderConfig::google("gid", "gsecret", "http://localhost:8080/google-callback")
            .unwrap()
            .with_token_endpoint(Url::parse(&format!("{}/google/token", server.uri())).unwrap())
            .with_events_endpoint(Url::parse(&format!("{}/google/events", server.uri())).unwrap());
        let outlook = ProviderConfig::outlook(
            "common",
            "oid",
            "osecret",
            "http://localhost:8080/outlook-callback",
        )
        .unwrap()
        .with_token_endpoint(Url::parse(&format!("{}/outlook/token", server.uri())).unwrap())
        .with_events_endpoint(Url::parse(&format!("{}/outlook/events", server.uri())).unwrap());
        Arc::new(ProviderRegistry::new([google, outlook]).unwrap())
    }

    fn orchestrator(server: &MockServer, ttl: Duration) -> Orchestrator {
        let config = ServerConfig::default()
            .with_request_ttl(ttl)
            .with_http_timeout(Duration::from_secs(5));
        Orchestrator::new(registry(server), &config).unwrap()
    }

    async fn mount_google(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/google/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "g-token", "expires_in": 3600
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/google/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "late", "summary": "Late", "start": {"dateTime": "2025-03-15T12:00:00Z"}},
                    {"id": "early", "summary": "Early", "start": {"dateTime": "2025-03-15T09:00:00Z"}}
                ]
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn lifecycle_edges() {
        use ConnectionState::*;
        let path = [Init, AwaitingCallback, Exchanging, Fetching, Normalizing, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!Init.can_transition_to(Exchanging));
        assert!(!Fetching.can_transition_to(Exchanging));
        assert!(Exchanging.can_transition_to(Failed(ErrorKind::NetworkError)));
        assert!(!Done.can_transition_to(Failed(ErrorKind::InternalError)));
        assert!(Failed(ErrorKind::Unauthorized).is_terminal());
        assert!(matches!(
            Done.transition(Init),
            Err(OrchestratorError::InvalidTransition { .. })
        ));
        assert_eq!(Failed(ErrorKind::CsrfMismatch).to_string(), "failed(csrf_mismatch)");
    }

    #[test]
    fn error_kinds() {
        assert_eq!(OrchestratorError::UnknownState.kind(), ErrorKind::CsrfMismatch);
        assert_eq!(
            OrchestratorError::ProviderMismatch {
                expected: ProviderId::Google,
                actual: ProviderId::Outlook
            }
            .kind(),
            ErrorKind::CsrfMismatch
        );
        assert_eq!(
            OrchestratorError::from(ProviderError::network("timed out")).kind(),
            ErrorKind::NetworkError
        );
        assert_eq!(
            OrchestratorError::from(ProviderError::configuration("boom")).to_response(),
            ErrorResponse::from_kind(ErrorKind::InternalError)
        );
    }

    #[tokio::test]
    async fn begin_records_unique_states() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server, Duration::from_secs(60));

        let mut states = HashSet::new();
        for _ in 0..100 {
            let auth = orchestrator.begin("google", None).await.unwrap();
            assert!(states.insert(auth.state));
        }
        assert_eq!(orchestrator.pending_len().await, 100);
    }

    #[tokio::test]
    async fn begin_unknown_provider() {
        let server = MockServer::start().await;
        let err = orchestrator(&server, Duration::from_secs(60))
            .begin("yahoo", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownProvider);
    }

    #[tokio::test]
    async fn complete_returns_sorted_events_once() {
        let server = MockServer::start().await;
        mount_google(&server).await;
        let orchestrator = orchestrator(&server, Duration::from_secs(60));

        let auth = orchestrator.begin("google", None).await.unwrap();
        let events = orchestrator
            .complete(Some(ProviderId::Google), "code", &auth.state)
            .await
            .unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);

        let replay = orchestrator
            .complete(Some(ProviderId::Google), "code", &auth.state)
            .await
            .unwrap_err();
        assert_eq!(replay.kind(), ErrorKind::CsrfMismatch);
    }

    #[tokio::test]
    async fn complete_on_wrong_route_consumes_state() {
        let server = MockServer::start().await;
        mount_google(&server).await;
        let orchestrator = orchestrator(&server, Duration::from_secs(60));

        let auth = orchestrator.begin("google", None).await.unwrap();
        let err = orchestrator
            .complete(Some(ProviderId::Outlook), "code", &auth.state)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ProviderMismatch { .. }));
        assert_eq!(orchestrator.pending_len().await, 0);
    }

    #[tokio::test]
    async fn late_callback_is_expired() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server, Duration::from_millis(100));

        let auth = orchestrator.begin("outlook", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let err = orchestrator
            .complete(None, "code", &auth.state)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpiredRequest);
    }

    #[tokio::test]
    async fn provider_denial_consumes_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let orchestrator = orchestrator(&server, Duration::from_secs(60));

        let auth = orchestrator.begin("google", None).await.unwrap();
        let err = orchestrator
            .reject(Some(ProviderId::Google), &auth.state, "access_denied")
            .await;
        assert_eq!(err.kind(), ErrorKind::ProviderError);
        assert!(err.to_response().message.contains("access_denied"));

        let replay = orchestrator
            .complete(Some(ProviderId::Google), "code", &auth.state)
            .await
            .unwrap_err();
        assert_eq!(replay.kind(), ErrorKind::CsrfMismatch);
    }

    #[tokio::test]
    async fn unrecognized_denial_is_not_echoed() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server, Duration::from_secs(60));

        let auth = orchestrator.begin("outlook", None).await.unwrap();
        let err = orchestrator
            .reject(None, &auth.state, "<script>alert(1)</script>")
            .await;
        assert!(matches!(err, OrchestratorError::Denied { error: None, .. }));

        let response = err.to_response();
        assert_eq!(response.error, ErrorKind::ProviderError);
        assert_eq!(response.message, ErrorKind::ProviderError.user_message());
    }

    #[test]
    fn responses_use_fixed_messages() {
        let unauthorized =
            OrchestratorError::from(ProviderError::unauthorized("access token was rejected"))
                .to_response();
        assert_eq!(unauthorized.error, ErrorKind::Unauthorized);
        assert!(unauthorized.message.contains("reconnect"));
        assert!(!unauthorized.message.contains("access token was rejected"));

        let expired = OrchestratorError::Expired {
            provider: ProviderId::Google,
        }
        .to_response();
        assert_eq!(expired.message, "session expired, please reconnect");

        let missing = OrchestratorError::MissingParameter("state").to_response();
        assert!(missing.message.ends_with(": state"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callbacks_with_one_state_succeed_once() {
        let server = MockServer::start().await;
        mount_google(&server).await;
        let orchestrator = orchestrator(&server, Duration::from_secs(60));
        let auth = orchestrator.begin("google", None).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = orchestrator.clone();
                let state = auth.state.clone();
                tokio::spawn(async move {
                    orchestrator
                        .complete(Some(ProviderId::Google), "code", &state)
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(events) => {
                    assert_eq!(events.len(), 2);
                    successes += 1;
                }
                Err(err) => assert_eq!(err.kind(), ErrorKind::CsrfMismatch),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(orchestrator.pending_len().await, 0);
    }
}
