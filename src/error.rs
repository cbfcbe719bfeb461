// Error handling module
// Defines the error taxonomy shared by the token manager, transport and data operations

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the SDK
///
/// Cloneable so that a single in-flight authentication can hand the same
/// outcome to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    /// Invalid or missing options, rejected before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Login or refresh round-trip failed
    #[error("Unable to get tokens: {0}")]
    Auth(String),

    /// No token pair is stored for the requested alias
    #[error("Token is not available")]
    TokenNotAvailable,

    /// Stored pair for the alias has no refresh token
    #[error("There is no refresh token for {0}")]
    NoRefreshToken(String),

    /// Server answered with a non-success status
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication round-trip exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Token storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// Whether the error ends the session rather than a single attempt
    pub fn is_fatal(&self) -> bool {
        matches!(self, SdkError::NoRefreshToken(_))
    }
}

impl From<rusqlite::Error> for SdkError {
    fn from(err: rusqlite::Error) -> Self {
        SdkError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::InvalidResponse(err.to_string())
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SdkError::Auth("HTTP error: 401 - bad key".to_string());
        assert_eq!(err.to_string(), "Unable to get tokens: HTTP error: 401 - bad key");

        let err = SdkError::TokenNotAvailable;
        assert_eq!(err.to_string(), "Token is not available");

        let err = SdkError::NoRefreshToken("apikey".to_string());
        assert_eq!(err.to_string(), "There is no refresh token for apikey");

        let err = SdkError::Http {
            status: 429,
            message: "Rate limit exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error: 429 - Rate limit exceeded");
    }

    #[test]
    fn test_config_error_message() {
        let err = SdkError::Config("Please supply a valid Jexia project ID.".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: Please supply a valid Jexia project ID."
        );
    }

    #[test]
    fn test_timeout_error_message() {
        let err = SdkError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Request timed out after 30s");
    }

    #[test]
    fn test_only_missing_refresh_token_is_fatal() {
        assert!(SdkError::NoRefreshToken("apikey".to_string()).is_fatal());
        assert!(!SdkError::TokenNotAvailable.is_fatal());
        assert!(!SdkError::Network("connection refused".to_string()).is_fatal());
        assert!(!SdkError::Auth("boom".to_string()).is_fatal());
    }

    #[test]
    fn test_conversions() {
        let err: SdkError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, SdkError::InvalidResponse(_)));

        let err: SdkError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, SdkError::Storage(_)));
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = SdkError::Http {
            status: 500,
            message: "Server error".to_string(),
        };
        assert_eq!(err.clone(), err);
    }
}
