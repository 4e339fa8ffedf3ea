//! Error types for rtcbridge

use thiserror::Error;

/// Main error type for rtcbridge commands
///
/// Every command exposed to the consumer resolves either with its success
/// payload or with exactly one of these variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Unknown track, stream, sender, receiver, session or channel id
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of object that was looked up
        kind: &'static str,
        /// Identifier that was not found
        id: String,
    },

    /// Operation requires a foreground or session context that is absent
    #[error("Invalid state: {reason}")]
    InvalidState {
        /// Reason the current state rejects the operation
        reason: String,
    },

    /// Media acquisition produced nothing
    #[error("Aborted: {reason}")]
    Abort {
        /// Reason for the abort
        reason: String,
    },

    /// The engine refused to create a media source
    #[error("Failed to create {kind} source")]
    SourceCreation {
        /// Source kind ("audio" or "video")
        kind: String,
    },

    /// Capability not available on this controller or platform
    #[error("Not supported: {operation}")]
    NotSupported {
        /// Operation that is not supported
        operation: String,
    },

    /// Unrecognized data-channel payload kind
    #[error("Unsupported data type: {data_type}")]
    UnsupportedType {
        /// The rejected payload kind
        data_type: String,
    },

    /// User or platform declined a capture permission
    #[error("Permission denied: {reason}")]
    PermissionDenied {
        /// Reason reported by the permission layer
        reason: String,
    },

    /// Payload could not be decoded
    #[error("Invalid payload: {reason}")]
    InvalidPayload {
        /// Decoding failure
        reason: String,
    },

    /// Capture device failure surfaced from an asynchronous device operation
    #[error("Device error: {reason}")]
    Device {
        /// Reason reported by the device
        reason: String,
    },

    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },
}

impl BridgeError {
    /// Shorthand for [`BridgeError::NotFound`]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        BridgeError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for [`BridgeError::InvalidState`]
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        BridgeError::InvalidState {
            reason: reason.into(),
        }
    }

    /// Error name reported at the consumer boundary
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::NotFound { .. } => "NotFoundError",
            BridgeError::InvalidState { .. } => "InvalidStateError",
            BridgeError::Abort { .. } => "AbortError",
            BridgeError::SourceCreation { .. } => "SourceCreationError",
            BridgeError::NotSupported { .. } => "NotSupportedError",
            BridgeError::UnsupportedType { .. } => "UnsupportedTypeError",
            BridgeError::PermissionDenied { .. } => "NotAllowedError",
            BridgeError::InvalidPayload { .. } => "InvalidPayloadError",
            BridgeError::Device { .. } => "DeviceError",
            BridgeError::Initialization { .. } => "InitializationError",
        }
    }
}

/// Result type alias for rtcbridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BridgeError::not_found("track", "t1").error_code(),
            "NotFoundError"
        );
        assert_eq!(
            BridgeError::invalid_state("no foreground context").error_code(),
            "InvalidStateError"
        );
        assert_eq!(
            BridgeError::PermissionDenied {
                reason: "declined".to_string()
            }
            .error_code(),
            "NotAllowedError"
        );
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::not_found("track", "abc");
        assert_eq!(err.to_string(), "track not found: abc");

        let err = BridgeError::UnsupportedType {
            data_type: "blob".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported data type: blob");
    }
}
