//! Error types and handling for Helios
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Helios operations
pub type Result<T> = std::result::Result<T, HeliosError>;

/// Main error type for Helios
#[derive(Debug, Error)]
pub enum HeliosError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network-related errors (HTTP, WebSocket transport)
    #[error("Network error: {message}")]
    Network { message: String },

    /// GraphQL API errors reported by the provider
    #[error("API error: {message}")]
    Api { message: String },

    /// Authentication/authorization errors (invalid or rotated token)
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// The configured home id is unknown to the provider
    #[error("Home not found: {message}")]
    HomeNotFound { message: String },

    /// Live subscription errors
    #[error("Subscription error: {message}")]
    Subscription { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl HeliosError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        HeliosError::Config {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        HeliosError::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        HeliosError::Api {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        HeliosError::Auth {
            message: message.into(),
        }
    }

    /// Create a new home-not-found error
    pub fn home_not_found<S: Into<String>>(message: S) -> Self {
        HeliosError::HomeNotFound {
            message: message.into(),
        }
    }

    /// Create a new subscription error
    pub fn subscription<S: Into<String>>(message: S) -> Self {
        HeliosError::Subscription {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        HeliosError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        HeliosError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        HeliosError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        HeliosError::Generic {
            message: message.into(),
        }
    }

    /// Whether the error indicates the home/token pairing is unrecoverable.
    ///
    /// Callers are expected to mark the owning device unavailable instead of
    /// retrying when this returns true.
    pub fn is_fatal_for_device(&self) -> bool {
        matches!(
            self,
            HeliosError::Auth { .. } | HeliosError::HomeNotFound { .. }
        )
    }
}

impl From<std::io::Error> for HeliosError {
    fn from(err: std::io::Error) -> Self {
        HeliosError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeliosError {
    fn from(err: serde_yaml::Error) -> Self {
        HeliosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeliosError {
    fn from(err: serde_json::Error) -> Self {
        HeliosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for HeliosError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HeliosError::timeout(err.to_string())
        } else {
            HeliosError::network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HeliosError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        HeliosError::network(err.to_string())
    }
}

impl From<chrono::ParseError> for HeliosError {
    fn from(err: chrono::ParseError) -> Self {
        HeliosError::validation("datetime", &err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = HeliosError::config("test config error");
        assert!(matches!(err, HeliosError::Config { .. }));

        let err = HeliosError::subscription("test subscription error");
        assert!(matches!(err, HeliosError::Subscription { .. }));

        let err = HeliosError::validation("field", "test validation error");
        assert!(matches!(err, HeliosError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = HeliosError::config("test error");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Configuration error: test error");

        let err = HeliosError::validation("test_field", "invalid value");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Validation error: test_field - invalid value");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(HeliosError::auth("bad token").is_fatal_for_device());
        assert!(HeliosError::home_not_found("gone").is_fatal_for_device());
        assert!(!HeliosError::network("flaky").is_fatal_for_device());
        assert!(!HeliosError::timeout("slow").is_fatal_for_device());
    }
}
