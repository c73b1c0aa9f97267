//! Error types for OpenManage job tracking.
//!
//! Transport failures are kept in their own enum so callers can tell an
//! unreachable controller apart from a controller that answered badly.

use thiserror::Error;

use crate::jobs::JobStateDocument;

/// Result type alias for OpenManage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the HTTP/Redfish transport.
///
/// The polling core never retries these; they propagate to the caller as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, DNS failure or request timeout.
    #[error("Unable to reach '{url}': {message}")]
    Unreachable {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// TLS handshake failed, including certificate validation.
    #[error("TLS failure talking to '{url}': {message}")]
    Tls {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// The request could not be built, redirected or sent.
    #[error("Request to '{url}' failed: {message}")]
    Request {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// The controller answered with a non-2xx status.
    #[error("HTTP {status} from '{url}': {message}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The body was not valid JSON, or not a JSON object.
    #[error("Malformed response from '{url}': {message}")]
    Malformed {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// An asynchronous response carried no `Location` header.
    #[error("Response {status} from '{url}' did not include a job Location header")]
    MissingLocation {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },
}

impl TransportError {
    /// Returns true if the controller could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Unreachable { .. })
    }

    /// Returns the HTTP status, if the controller answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } | TransportError::MissingLocation { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// The main error type for OpenManage.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Remote call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    // ========================================================================
    // Tracking Errors
    // ========================================================================
    /// Poll budget rejected before any fetch.
    #[error("Invalid poll budget: {0}")]
    InvalidBudget(String),

    /// Tracking URI could not be used to identify a job.
    #[error("Invalid job tracking URI '{uri}': {message}")]
    InvalidTrackingUri {
        /// The offending URI
        uri: String,
        /// Error message
        message: String,
    },

    /// A state was configured both as success and as failure.
    #[error("Overlapping job states found: {}", .0.join(", "))]
    OverlappingStates(Vec<String>),

    /// Polling was cancelled before the job reached a terminal state.
    #[error("Tracking of job '{job_id}' cancelled after {elapsed_secs} seconds")]
    Cancelled {
        /// Job identifier
        job_id: String,
        /// Seconds spent polling
        elapsed_secs: u64,
        /// Last document fetched before cancellation
        last: Box<JobStateDocument>,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Error {
    /// Creates a new invalid tracking URI error.
    pub fn invalid_tracking_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTrackingUri {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if the underlying cause is an unreachable controller.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Transport(t) if t.is_unreachable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Status {
            url: "https://192.168.0.1/redfish/v1/Jobs/JID_1".to_string(),
            status: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 404 from 'https://192.168.0.1/redfish/v1/Jobs/JID_1': Not Found"
        );
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_unreachable());
    }

    #[test]
    fn test_unreachable_propagates_through_error() {
        let err: Error = TransportError::Unreachable {
            url: "https://10.0.0.1".to_string(),
            message: "connection refused".to_string(),
        }
        .into();
        assert!(err.is_unreachable());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_tls_failure_is_not_unreachable() {
        let err: Error = TransportError::Tls {
            url: "https://10.0.0.1/redfish/v1".to_string(),
            message: "invalid peer certificate: UnknownIssuer".to_string(),
        }
        .into();
        assert!(!err.is_unreachable());
        assert!(err.to_string().starts_with("TLS failure talking to"));
    }

    #[test]
    fn test_overlapping_states_display() {
        let err = Error::OverlappingStates(vec!["Completed".to_string(), "Failed".to_string()]);
        assert_eq!(
            err.to_string(),
            "Overlapping job states found: Completed, Failed"
        );
    }
}
