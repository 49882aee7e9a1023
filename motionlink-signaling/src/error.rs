//! Signaling error types

use motionlink_core::MotionLinkError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the signaling channel
#[derive(Error, Debug)]
pub enum SignalingError {
    /// WebSocket handshake or transport failure
    #[error("Connection to {url} failed: {reason}")]
    Connect {
        /// Endpoint URL
        url: String,
        /// Failure reason
        reason: String,
    },

    /// Connect attempt did not finish in time
    #[error("Connection to {url} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Endpoint URL
        url: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// The client is closed or has given up reconnecting
    #[error("Signaling channel closed")]
    Closed,

    /// Message could not be encoded
    #[error("Failed to encode {event}: {source}")]
    Serialization {
        /// Event name
        event: String,
        /// Serializer error
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias for signaling operations
pub type SignalingResult<T> = Result<T, SignalingError>;

impl SignalingError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            SignalingError::Connect { .. } => "SIGNALING_CONNECT_FAILED",
            SignalingError::ConnectTimeout { .. } => "SIGNALING_CONNECT_TIMEOUT",
            SignalingError::Closed => "SIGNALING_CLOSED",
            SignalingError::Serialization { .. } => "SIGNALING_SERIALIZATION",
        }
    }
}

impl From<SignalingError> for MotionLinkError {
    fn from(error: SignalingError) -> Self {
        match error {
            SignalingError::ConnectTimeout { timeout, .. } => MotionLinkError::Timeout {
                operation: "signaling connect".to_string(),
                duration: timeout,
            },
            other => MotionLinkError::Signaling {
                reason: other.to_string(),
            },
        }
    }
}
