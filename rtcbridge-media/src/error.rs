//! Capture and track error types
//!
//! Device-level failures raised while driving capture controllers. They are
//! converted into the consumer-facing [`BridgeError`] at the command boundary.

use rtcbridge_core::BridgeError;
use thiserror::Error;

/// Main error type for capture and track operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Invalid constraints provided
    #[error("Invalid constraints: {message}")]
    InvalidConstraints {
        /// Error message
        message: String,
    },

    /// Device not found error
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// Capture device reported a failure
    #[error("Capture failed: {reason}")]
    CaptureFailed {
        /// Failure reason
        reason: String,
    },

    /// Capture not active error
    #[error("Capture not active")]
    CaptureNotActive,

    /// Controller does not support the operation
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Operation name
        operation: String,
    },

    /// Track is not managed by the registry
    #[error("Track not found: {track_id}")]
    TrackNotFound {
        /// Track identifier
        track_id: String,
    },

    /// Engine refused to create a source
    #[error("Source creation failed for {kind} track")]
    SourceCreationFailed {
        /// Track kind
        kind: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MediaError::CaptureFailed { .. } | MediaError::CaptureNotActive
        )
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::InvalidConstraints { .. } => ErrorCategory::Configuration,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::CaptureFailed { .. } => ErrorCategory::Device,
            MediaError::CaptureNotActive => ErrorCategory::State,
            MediaError::Unsupported { .. } => ErrorCategory::Platform,
            MediaError::TrackNotFound { .. } => ErrorCategory::State,
            MediaError::SourceCreationFailed { .. } => ErrorCategory::Device,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration and parameter errors
    Configuration,
    /// Device and hardware errors
    Device,
    /// State management errors
    State,
    /// Platform capability errors
    Platform,
}

impl From<MediaError> for BridgeError {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::TrackNotFound { track_id } => BridgeError::not_found("track", track_id),
            MediaError::Unsupported { operation } => BridgeError::NotSupported { operation },
            MediaError::SourceCreationFailed { kind } => BridgeError::SourceCreation { kind },
            MediaError::DeviceNotFound { device_id } => BridgeError::not_found("device", device_id),
            other => BridgeError::Device {
                reason: other.to_string(),
            },
        }
    }
}

impl From<BridgeError> for MediaError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::NotSupported { operation } => MediaError::Unsupported { operation },
            BridgeError::SourceCreation { kind } => MediaError::SourceCreationFailed { kind },
            other => MediaError::CaptureFailed {
                reason: other.to_string(),
            },
        }
    }
}
