//! Error types for Recplay

use std::io;

use hyper::StatusCode;
use thiserror::Error;

use crate::matching::MatchDiagnostic;

/// Result type for Recplay operations
pub type Result<T> = std::result::Result<T, RecplayError>;

/// Errors that can occur in Recplay
#[derive(Debug, Error)]
pub enum RecplayError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The recording id is not registered (never started, or already stopped)
    #[error("Unknown recording id '{0}'. Was the session started, and is the id current?")]
    UnknownRecordingId(String),

    /// Stop was issued twice for the same recording id
    #[error("Recording id '{0}' has already been stopped")]
    DuplicateSessionStop(String),

    /// Playback lookup exhausted the pool
    #[error("Unable to find a record for the request {method} {uri}\n{diagnostic}")]
    NoMatchFound {
        /// Request method
        method: String,
        /// Request URI (sanitized)
        uri: String,
        /// Which rules were checked and which failed
        diagnostic: MatchDiagnostic,
    },

    /// Upstream did not answer in time
    #[error("Upstream {uri} did not respond within {timeout_ms} ms")]
    UpstreamTimeout {
        /// Upstream URI
        uri: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Upstream could not be reached or the exchange broke off
    #[error("Upstream {uri} failed: {reason}")]
    UpstreamConnectionFailure {
        /// Upstream URI
        uri: String,
        /// Failure detail
        reason: String,
    },

    /// Sanitizer or transform registration rejected
    #[error("Malformed sanitizer configuration for '{name}': {reason}")]
    MalformedSanitizerConfig {
        /// Sanitizer or transform name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Matcher registration rejected
    #[error("Malformed matcher configuration for '{name}': {reason}")]
    MalformedMatcherConfig {
        /// Matcher name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Client request is missing data or carries invalid values
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Recording file not found
    #[error("Recording file not found: {0}")]
    FileNotFound(String),

    /// Invalid recording file format
    #[error("Invalid recording format: {0}")]
    InvalidFormat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// The caller went away while the response was being prepared
    #[error("Request cancelled")]
    Cancelled,
}

impl RecplayError {
    /// HTTP status reported to the client for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownRecordingId(_)
            | Self::MalformedSanitizerConfig { .. }
            | Self::MalformedMatcherConfig { .. }
            | Self::InvalidRequest(_)
            | Self::InvalidFormat(_)
            | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::NoMatchFound { .. } | Self::FileNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateSessionStop(_) => StatusCode::CONFLICT,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamConnectionFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Self::Io(_) | Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn sanitizer_config(name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedSanitizerConfig {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn matcher_config(name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedMatcherConfig {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RecplayError::UnknownRecordingId("abc".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RecplayError::DuplicateSessionStop("abc".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RecplayError::UpstreamTimeout {
                uri: "http://example.com/".to_string(),
                timeout_ms: 10,
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_unknown_id_message_names_id() {
        let error = RecplayError::UnknownRecordingId("1234".to_string());
        assert!(error.to_string().contains("1234"));
    }
}
