//! # Error Types
//!
//! Crate-wide error types for the local control plane core using `thiserror`.

use std::fmt;

/// Custom result type for localplane operations
pub type Result<T> = std::result::Result<T, LocalplaneError>;

/// Main error type for the local control plane core
#[derive(thiserror::Error, Debug)]
pub enum LocalplaneError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Persisted config store errors
    #[error("Config store error: {message}")]
    Store { message: String },

    /// Authentication and authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String, error_type: AuthErrorType },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Authentication error subtypes
#[derive(Debug, Clone, PartialEq)]
pub enum AuthErrorType {
    InvalidToken,
    MissingToken,
    InsufficientPermissions,
    WeakCredential,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::InvalidToken => write!(f, "invalid_token"),
            AuthErrorType::MissingToken => write!(f, "missing_token"),
            AuthErrorType::InsufficientPermissions => write!(f, "insufficient_permissions"),
            AuthErrorType::WeakCredential => write!(f, "weak_credential"),
        }
    }
}

impl LocalplaneError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a config store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store { message: message.into() }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth { message: message.into(), error_type }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocalplaneError::Store { .. } | LocalplaneError::Io { .. })
    }
}

impl From<std::io::Error> for LocalplaneError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for LocalplaneError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = LocalplaneError::config("missing driver");
        assert!(matches!(error, LocalplaneError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: missing driver");
    }

    #[test]
    fn test_auth_error() {
        let error = LocalplaneError::auth("bad token", AuthErrorType::InvalidToken);
        if let LocalplaneError::Auth { error_type, .. } = error {
            assert_eq!(error_type, AuthErrorType::InvalidToken);
        } else {
            panic!("expected auth error");
        }
    }

    #[test]
    fn test_auth_error_type_display() {
        assert_eq!(AuthErrorType::InvalidToken.to_string(), "invalid_token");
        assert_eq!(AuthErrorType::MissingToken.to_string(), "missing_token");
        assert_eq!(AuthErrorType::WeakCredential.to_string(), "weak_credential");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LocalplaneError::store("not ready").is_retryable());
        assert!(!LocalplaneError::config("bad").is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LocalplaneError = io_error.into();
        assert!(matches!(err, LocalplaneError::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: LocalplaneError = json_error.into();
        assert!(matches!(err, LocalplaneError::Serialization { .. }));
    }
}
