//! Error types for Tracemark.
//!
//! Provides structured errors with:
//! - Unique error codes for reporting
//! - Source error chaining

use std::io;
use thiserror::Error;

/// Result type for Tracemark operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes for reporting.
///
/// Codes are structured as:
/// - 1xxx: Validation errors (client)
/// - 2xxx: Not found errors (client)
/// - 5xxx: Storage errors (server)
/// - 6xxx: Internal errors (server)
/// - 7xxx: Network errors (server)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidDigest = 1001,
    InvalidEvent = 1002,
    InvalidPayload = 1003,
    InvalidFormat = 1004,
    InvalidConfig = 1005,

    // Not found errors (2xxx)
    RecordNotFound = 2002,

    // Storage errors (5xxx)
    StorageRead = 5001,
    StorageWrite = 5002,
    StorageCorruption = 5003,
    StorageInit = 5004,

    // Internal errors (6xxx)
    Serialization = 6001,
    Deserialization = 6002,
    Internal = 6003,

    // Network errors (7xxx)
    ConnectionFailed = 7001,
    Timeout = 7002,
    ProtocolError = 7003,
}

impl ErrorCode {
    /// Get the numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Errors that can occur in Tracemark.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Validation Errors (client errors)
    // ========================================================================
    /// Invalid digest format or value.
    #[error("[{code}] invalid digest: {message}")]
    InvalidDigest {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Anchor event or pending record failed validation.
    #[error("[{code}] invalid event: {message}")]
    InvalidEvent { code: ErrorCode, message: String },

    /// Payload could not be canonicalized or is malformed.
    #[error("[{code}] invalid payload: {message}")]
    InvalidPayload { code: ErrorCode, message: String },

    /// Configuration is inconsistent.
    #[error("[{code}] invalid configuration: {message}")]
    InvalidConfig { code: ErrorCode, message: String },

    // ========================================================================
    // Not Found Errors (client errors)
    // ========================================================================
    /// Item not found.
    #[error("[{code}] not found: {message}")]
    NotFound { code: ErrorCode, message: String },

    // ========================================================================
    // Storage Errors (server errors)
    // ========================================================================
    /// Storage operation failed.
    #[error("[{code}] storage error: {message}")]
    Storage {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Serialization Errors (server errors)
    // ========================================================================
    /// Serialization/deserialization failed.
    #[error("[{code}] serialization error: {message}")]
    Serialization {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Network Errors (server errors)
    // ========================================================================
    /// Remote collaborator could not be reached or answered badly.
    #[error("[{code}] network error: {message}")]
    Network { code: ErrorCode, message: String },

    // ========================================================================
    // Internal Errors (server errors)
    // ========================================================================
    /// Internal error.
    #[error("[{code}] internal error: {message}")]
    Internal { code: ErrorCode, message: String },
}

impl Error {
    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidDigest { code, .. } => *code,
            Error::InvalidEvent { code, .. } => *code,
            Error::InvalidPayload { code, .. } => *code,
            Error::InvalidConfig { code, .. } => *code,
            Error::NotFound { code, .. } => *code,
            Error::Storage { code, .. } => *code,
            Error::Serialization { code, .. } => *code,
            Error::Network { code, .. } => *code,
            Error::Internal { code, .. } => *code,
        }
    }
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl Error {
    /// Create an InvalidDigest error.
    pub fn invalid_digest(message: impl Into<String>) -> Self {
        Error::InvalidDigest {
            code: ErrorCode::InvalidDigest,
            message: message.into(),
            source: None,
        }
    }

    /// Create an InvalidEvent error.
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Error::InvalidEvent {
            code: ErrorCode::InvalidEvent,
            message: message.into(),
        }
    }

    /// Create an InvalidPayload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Error::InvalidPayload {
            code: ErrorCode::InvalidPayload,
            message: message.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            code: ErrorCode::InvalidConfig,
            message: message.into(),
        }
    }

    /// Create a NotFound error (generic).
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            code: ErrorCode::RecordNotFound,
            message: message.into(),
        }
    }

    /// Create a Storage read error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            code: ErrorCode::StorageRead,
            message: message.into(),
            source: None,
        }
    }

    /// Create a Storage write error.
    pub fn storage_write(message: impl Into<String>) -> Self {
        Error::Storage {
            code: ErrorCode::StorageWrite,
            message: message.into(),
            source: None,
        }
    }

    /// Create a Storage corruption error.
    pub fn storage_corruption(message: impl Into<String>) -> Self {
        Error::Storage {
            code: ErrorCode::StorageCorruption,
            message: message.into(),
            source: None,
        }
    }

    /// Create a Network error for an unreachable collaborator.
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Network {
            code: ErrorCode::ConnectionFailed,
            message: message.into(),
        }
    }

    /// Create a Network timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Network {
            code: ErrorCode::Timeout,
            message: message.into(),
        }
    }

    /// Create a Network protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Network {
            code: ErrorCode::ProtocolError,
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            code: ErrorCode::Internal,
            message: message.into(),
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        let code = if e.is_data() || e.is_syntax() || e.is_eof() {
            ErrorCode::Deserialization
        } else {
            ErrorCode::Serialization
        };
        Error::Serialization {
            code,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Storage {
            code: ErrorCode::StorageRead,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::InvalidDigest {
            code: ErrorCode::InvalidDigest,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::InvalidDigest.code(), 1001);
        assert_eq!(ErrorCode::RecordNotFound.code(), 2002);
        assert_eq!(ErrorCode::StorageRead.code(), 5001);
    }

    #[test]
    fn test_error_display() {
        let e = Error::invalid_digest("bad hex");
        assert!(e.to_string().contains("E1001"));
        assert!(e.to_string().contains("bad hex"));
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::InvalidDigest.to_string(), "E1001");
        assert_eq!(ErrorCode::Internal.to_string(), "E6003");
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.code(), ErrorCode::Deserialization);
    }

    #[test]
    fn test_error_constructors() {
        let e = Error::invalid_event("missing subject");
        assert_eq!(e.code(), ErrorCode::InvalidEvent);

        let e = Error::storage_write("disk full");
        assert_eq!(e.code(), ErrorCode::StorageWrite);

        let e = Error::timeout("rpc");
        assert_eq!(e.code(), ErrorCode::Timeout);
    }
}
