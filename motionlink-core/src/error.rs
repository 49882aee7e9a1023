//! Error types for MotionLink

use std::time::Duration;
use thiserror::Error;

/// Main error type for MotionLink operations
#[derive(Error, Debug)]
pub enum MotionLinkError {
    /// The platform refused camera access
    #[error("Camera permission denied: {reason}")]
    PermissionDenied {
        /// Reason reported by the capture backend
        reason: String,
    },

    /// No usable camera, or the camera is held elsewhere
    #[error("Camera device unavailable: {reason}")]
    DeviceUnavailable {
        /// Reason reported by the capture backend
        reason: String,
    },

    /// HTTP transport error talking to the backend
    #[error("HTTP request to {endpoint} failed: {source}")]
    Http {
        /// Endpoint path that failed
        endpoint: String,
        /// Underlying error
        #[source]
        source: reqwest::Error,
    },

    /// Backend answered with a non-success status
    #[error("Backend rejected {endpoint} with status {status}: {body}")]
    BackendRejected {
        /// Endpoint path
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// A payload could not be decoded
    #[error("Invalid payload: {reason}")]
    InvalidPayload {
        /// Reason for the failure
        reason: String,
    },

    /// Event stream transport failure
    #[error("Event stream error: {reason}")]
    EventStream {
        /// Reason for the failure
        reason: String,
    },

    /// Signaling channel failure
    #[error("Signaling error: {reason}")]
    Signaling {
        /// Reason for the failure
        reason: String,
    },

    /// Peer connection failure
    #[error("Peer connection error: {reason}")]
    PeerConnection {
        /// Reason for the failure
        reason: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Media processing error
    #[error("Media processing error: {reason}")]
    Media {
        /// Reason for media error
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {field}: {reason}")]
    Configuration {
        /// Offending configuration field
        field: String,
        /// Reason it was rejected
        reason: String,
    },
}

impl MotionLinkError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            MotionLinkError::PermissionDenied { .. } => "PERMISSION_DENIED".to_string(),
            MotionLinkError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE".to_string(),
            MotionLinkError::Http { .. } => "HTTP_ERROR".to_string(),
            MotionLinkError::BackendRejected { .. } => "BACKEND_REJECTED".to_string(),
            MotionLinkError::InvalidPayload { .. } => "INVALID_PAYLOAD".to_string(),
            MotionLinkError::EventStream { .. } => "EVENT_STREAM_ERROR".to_string(),
            MotionLinkError::Signaling { .. } => "SIGNALING_ERROR".to_string(),
            MotionLinkError::PeerConnection { .. } => "PEER_CONNECTION_ERROR".to_string(),
            MotionLinkError::InvalidState { .. } => "INVALID_STATE".to_string(),
            MotionLinkError::Timeout { .. } => "TIMEOUT".to_string(),
            MotionLinkError::Media { .. } => "MEDIA_ERROR".to_string(),
            MotionLinkError::Configuration { .. } => "CONFIGURATION_ERROR".to_string(),
        }
    }

    /// Whether the failure came from camera acquisition (fatal to a live transition)
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            MotionLinkError::PermissionDenied { .. } | MotionLinkError::DeviceUnavailable { .. }
        )
    }

    /// Wrap a transport error raised while calling `endpoint`
    pub fn http(endpoint: &str, source: reqwest::Error) -> Self {
        MotionLinkError::Http {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}

/// Result alias used across MotionLink crates
pub type Result<T> = std::result::Result<T, MotionLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let denied = MotionLinkError::PermissionDenied {
            reason: "user said no".to_string(),
        };
        assert_eq!(denied.error_code(), "PERMISSION_DENIED");
        assert!(denied.is_acquisition_failure());

        let rejected = MotionLinkError::BackendRejected {
            endpoint: "/api/detect".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(rejected.error_code(), "BACKEND_REJECTED");
        assert!(!rejected.is_acquisition_failure());
        assert!(rejected.to_string().contains("500"));
    }
}
