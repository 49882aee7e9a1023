//! Media error types and handling
//!
//! Errors raised while acquiring the camera, encoding frames or delivering
//! them to the backend. Every variant converts into the workspace-wide
//! [`MotionLinkError`].

use motionlink_core::MotionLinkError;
use thiserror::Error;

/// Main error type for media operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// The platform refused camera access
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// No camera, or the camera could not be opened
    #[error("Device unavailable: {reason}")]
    DeviceUnavailable {
        /// Failure reason
        reason: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Encoding operation failed
    #[error("Encoding failed: {codec} - {reason}")]
    EncodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Codec initialization failed
    #[error("Codec initialization failed: {codec} - {reason}")]
    CodecInitializationFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Capture not active error
    #[error("Capture not active")]
    CaptureNotActive,

    /// Upload to the backend failed
    #[error("Upload failed: {source}")]
    Upload {
        /// Backend error
        #[source]
        source: MotionLinkError,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    ///
    /// Recoverable failures are logged by the delivery loop and the next tick
    /// proceeds independently.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Io { .. } => true,
            MediaError::EncodingFailed { .. } => true,
            MediaError::InvalidFrameData { .. } => true,
            MediaError::Upload { .. } => true,
            MediaError::PermissionDenied { .. } => false,
            MediaError::DeviceUnavailable { .. } => false,
            MediaError::InvalidConfiguration { .. } => false,
            MediaError::CodecInitializationFailed { .. } => false,
            MediaError::CaptureNotActive => false,
        }
    }
}

impl From<MediaError> for MotionLinkError {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::PermissionDenied { operation } => {
                MotionLinkError::PermissionDenied { reason: operation }
            }
            MediaError::DeviceUnavailable { reason } => {
                MotionLinkError::DeviceUnavailable { reason }
            }
            MediaError::InvalidConfiguration { message } => MotionLinkError::Configuration {
                field: "media".to_string(),
                reason: message,
            },
            MediaError::Upload { source } => source,
            other => MotionLinkError::Media {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let io_error = MediaError::Io {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        assert!(io_error.is_recoverable());

        let denied = MediaError::PermissionDenied {
            operation: "open camera 0".to_string(),
        };
        assert!(!denied.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::InvalidFrameData {
            expected: 1024,
            actual: 512,
        };
        assert_eq!(
            error.to_string(),
            "Invalid frame data: expected 1024 bytes, got 512"
        );
    }

    #[test]
    fn test_conversion_keeps_acquisition_kind() {
        let converted: MotionLinkError = MediaError::PermissionDenied {
            operation: "open camera 0".to_string(),
        }
        .into();
        assert!(converted.is_acquisition_failure());
        assert_eq!(converted.error_code(), "PERMISSION_DENIED");

        let converted: MotionLinkError = MediaError::DeviceUnavailable {
            reason: "busy".to_string(),
        }
        .into();
        assert_eq!(converted.error_code(), "DEVICE_UNAVAILABLE");
    }
}
