//! Server error types.

use std::io;

use calfuse_core::TracingError;
use calfuse_providers::ProviderError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (bind, accept, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Provider registry or HTTP client setup failed.
    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    /// Logging could not be initialized.
    #[error("Tracing setup failed: {0}")]
    Tracing(#[from] TracingError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
