//! Request and response types for the calfuse HTTP API.

use calfuse_core::{ProviderId, UnifiedEvent};
use serde::{Deserialize, Serialize};

/// Query string of `GET /auth-url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUrlQuery {
    /// Provider name (`google` or `outlook`), parsed by the server.
    pub provider: String,
    /// Space-separated scopes to request; narrowed to the configured scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AuthUrlQuery {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Splits `scope` on whitespace. Blank or missing scope yields `None`.
    pub fn scopes(&self) -> Option<Vec<String>> {
        let scopes: Vec<String> = self
            .scope
            .as_deref()?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        (!scopes.is_empty()).then_some(scopes)
    }
}

/// Query string of the OAuth callback routes.
///
/// Every field is optional so that a missing parameter is reported as
/// `bad_request` instead of a framework rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Set by the provider when the user denied consent (e.g. `access_denied`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Response of `GET /auth-url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUrlResponse {
    /// Consent URL the user should be sent to.
    pub url: String,
}

/// Response of a successful callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Events sorted by start time, then source, then id.
    pub events: Vec<UnifiedEvent>,
}

/// Response of `GET /healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Providers accepted by `/auth-url`.
    pub providers: Vec<ProviderId>,
}

impl HealthResponse {
    pub fn ok(providers: Vec<ProviderId>) -> Self {
        Self {
            status: "ok".to_string(),
            providers,
        }
    }
}

/// Error kinds exposed to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Provider name not recognized or not configured.
    UnknownProvider,
    /// `state` unknown, already used, or issued for another provider.
    CsrfMismatch,
    /// `state` was issued but is past its lifetime.
    ExpiredRequest,
    /// Provider answered with an error status or denied consent.
    ProviderError,
    /// Provider could not be reached or timed out.
    NetworkError,
    /// Provider answered 2xx with an unusable body.
    MalformedResponse,
    /// Provider rejected the access token.
    Unauthorized,
    /// A provider event could not be mapped.
    NormalizationError,
    /// A required query parameter is missing or empty.
    BadRequest,
    /// Unexpected server-side failure.
    InternalError,
}

impl ErrorKind {
    /// HTTP status code returned for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownProvider | Self::CsrfMismatch | Self::ExpiredRequest | Self::BadRequest => {
                400
            }
            Self::Unauthorized => 401,
            Self::ProviderError | Self::MalformedResponse | Self::NormalizationError => 502,
            Self::NetworkError => 504,
            Self::InternalError => 500,
        }
    }

    /// Fixed message safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnknownProvider => "unsupported calendar provider",
            Self::CsrfMismatch => "invalid or already used authorization request",
            Self::ExpiredRequest => "session expired, please reconnect",
            Self::ProviderError => "the calendar provider returned an error",
            Self::NetworkError => "the calendar provider could not be reached",
            Self::MalformedResponse => "the calendar provider sent an unexpected response",
            Self::Unauthorized => "calendar access was rejected, please reconnect",
            Self::NormalizationError => "a calendar event could not be read",
            Self::BadRequest => "the request is missing a required parameter",
            Self::InternalError => "an internal error occurred",
        }
    }
}

/// Error body returned with every non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }

    /// Creates a response carrying only the kind's fixed user message.
    pub fn from_kind(error: ErrorKind) -> Self {
        Self::new(error, error.user_message())
    }

    /// Creates a response whose message is the kind's user message followed by `detail`.
    pub fn with_detail(error: ErrorKind, detail: impl std::fmt::Display) -> Self {
        Self::new(error, format!("{}: {detail}", error.user_message()))
    }
}
