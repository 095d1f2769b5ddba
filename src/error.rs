//! Custom error types for clank-dash.
//!
//! This module provides a centralized error handling system with specific error types
//! for different parts of the application.

use std::fmt;

/// Main error type for clank-dash operations.
#[derive(Debug)]
pub enum ClankDashError {
    /// Configuration errors (missing env vars, invalid values)
    Config(String),
    /// Key-value store operation errors
    Storage(String),
    /// Network/HTTP transport errors (request never produced a response)
    Network(String),
    /// Backend API errors carrying the HTTP status code.
    ///
    /// Status `0` means the request never reached the server (offline).
    Api { status: u16, message: String },
    /// Serialization errors for cached payloads
    Serialization(String),
    /// OAuth2 session flow errors (state handling, expiry)
    Auth(String),
    /// Validation errors (malformed permission strings, etc.)
    InvalidInput(String),
    /// Generic I/O errors
    Io(std::io::Error),
}

impl ClankDashError {
    /// HTTP status code of this error as seen by the classification table.
    ///
    /// API errors report their real status, transport errors report `0`
    /// (no response at all), everything else reports `u16::MAX` so it falls
    /// through to the catch-all mapping.
    pub fn status(&self) -> u16 {
        match self {
            Self::Api { status, .. } => *status,
            Self::Network(_) => 0,
            _ => u16::MAX,
        }
    }
}

impl fmt::Display for ClankDashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::Auth(msg) => write!(f, "Auth error: {}", msg),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ClankDashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClankDashError::Io(err) => Some(err),
            _ => None,
        }
    }
}

// Implement From traits for automatic error conversion
impl From<std::io::Error> for ClankDashError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<rusqlite::Error> for ClankDashError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ClankDashError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ClankDashError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::env::VarError> for ClankDashError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ClankDashError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("Task join error: {}", err))
    }
}

/// Result type alias for clank-dash operations.
pub type Result<T> = std::result::Result<T, ClankDashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_extraction() {
        let err = ClankDashError::Api {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.status(), 429);

        let err = ClankDashError::Network("connection refused".to_string());
        assert_eq!(err.status(), 0);

        let err = ClankDashError::Auth("state mismatch".to_string());
        assert_eq!(err.status(), u16::MAX);
    }
}
