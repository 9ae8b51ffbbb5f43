//! Error types for secret backend operations.

use thiserror::Error;

/// Result type for secrets operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while fetching secrets.
///
/// Backend-specific failures are normalized into [`SecretsError::Unavailable`]
/// at the provider boundary; anything else reaching a caller is either a
/// configuration problem or a genuine bug.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// The backend is (temporarily) unreachable or refused the request.
    #[error("Secret backend unavailable: {message} (retry after {retry_after_secs}s)")]
    Unavailable { message: String, retry_after_secs: u64 },

    /// The backend configuration is missing or malformed.
    #[error("Secret backend configuration invalid: {message}")]
    Config { message: String },

    /// Anything the taxonomy does not cover.
    #[error("Unexpected secret backend error: {message}")]
    Unexpected {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SecretsError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::Unavailable { message: message.into(), retry_after_secs }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected { message: message.into(), source: None }
    }

    /// Create an unexpected error with source.
    pub fn unexpected_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Unexpected { message: message.into(), source: Some(source) }
    }

    /// Stable reason label used for failure metrics.
    pub fn metric_reason(&self) -> &'static str {
        match self {
            SecretsError::Unavailable { .. } => "unavailable",
            SecretsError::Config { .. } => "configuration_invalid",
            SecretsError::Unexpected { .. } => "unexpected_error",
        }
    }

    /// Seconds after which the caller may retry, if known.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            SecretsError::Unavailable { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
