//! Error types for provider operations.
//!
//! Every failure in the OAuth and event pipeline is a [`ProviderError`]
//! tagged with a [`ProviderErrorCode`]. Upstream response bodies are kept for
//! diagnostics but never rendered by `Display`, so an error can be logged or
//! turned into a client response without echoing provider output.

use std::fmt;

use calfuse_core::{ProviderId, UnknownProviderId};
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// The provider id is not registered.
    UnknownProvider,
    /// The `state` presented on callback does not match an outstanding request.
    CsrfMismatch,
    /// The authorization request timed out before the callback arrived.
    ExpiredRequest,
    /// The provider answered with a non-success status.
    Upstream,
    /// Transport failure or timeout.
    Network,
    /// A success response that lacks required fields or is not valid JSON.
    MalformedResponse,
    /// The access token was rejected.
    Unauthorized,
    /// A provider event could not be mapped to a unified event.
    Normalization,
    /// Missing or invalid configuration.
    Configuration,
    /// The caller supplied invalid input.
    BadRequest,
}

impl ProviderErrorCode {
    /// Returns the snake_case name of this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownProvider => "unknown_provider",
            Self::CsrfMismatch => "csrf_mismatch",
            Self::ExpiredRequest => "expired_request",
            Self::Upstream => "provider_error",
            Self::Network => "network_error",
            Self::MalformedResponse => "malformed_response",
            Self::Unauthorized => "unauthorized",
            Self::Normalization => "normalization_error",
            Self::Configuration => "configuration_error",
            Self::BadRequest => "bad_request",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to, or interpreting data from, a provider.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    provider: Option<ProviderId>,
    /// Offending field for normalization errors (e.g. `start.dateTime`).
    field: Option<String>,
    /// HTTP status returned by the provider, if any.
    upstream_status: Option<u16>,
    /// Response body returned by the provider, for diagnostics only.
    upstream_body: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            field: None,
            upstream_status: None,
            upstream_body: None,
            source: None,
        }
    }

    /// Creates an unknown provider error.
    pub fn unknown_provider(name: impl fmt::Display) -> Self {
        Self::new(
            ProviderErrorCode::UnknownProvider,
            format!("provider '{name}' is not configured"),
        )
    }

    /// Creates a CSRF mismatch error.
    pub fn csrf_mismatch(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::CsrfMismatch, message)
    }

    /// Creates an expired request error.
    pub fn expired_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ExpiredRequest, message)
    }

    /// Creates an upstream error carrying the provider's status and body.
    pub fn upstream(message: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let mut err = Self::new(ProviderErrorCode::Upstream, message);
        err.upstream_status = Some(status);
        err.upstream_body = Some(body.into());
        err
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Network, message)
    }

    /// Creates a malformed response error.
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::MalformedResponse, message)
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Unauthorized, message)
    }

    /// Creates a normalization error naming the offending field.
    pub fn normalization(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let mut err = Self::new(
            ProviderErrorCode::Normalization,
            format!("{}: {}", field, message.into()),
        );
        err.field = Some(field);
        err
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Configuration, message)
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    /// Sets the provider for this error.
    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Prefixes the message with additional context.
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider, if set.
    pub fn provider(&self) -> Option<ProviderId> {
        self.provider
    }

    /// Returns the offending field of a normalization error.
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Returns the HTTP status the provider answered with.
    pub fn upstream_status(&self) -> Option<u16> {
        self.upstream_status
    }

    /// Returns the provider's response body.
    ///
    /// Meant for diagnostics; do not forward it to end users.
    pub fn upstream_body(&self) -> Option<&str> {
        self.upstream_body.as_deref()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(status) = self.upstream_status {
            write!(f, " (status {})", status)?;
        }
        Ok(())
    }
}

impl From<UnknownProviderId> for ProviderError {
    fn from(err: UnknownProviderId) -> Self {
        Self::unknown_provider(&err.0)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
