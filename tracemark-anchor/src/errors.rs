//! Error types for the anchor layer.

use thiserror::Error;

/// Result type for anchor operations.
pub type Result<T> = std::result::Result<T, AnchorError>;

/// Errors that prevent an anchor operation from running at all.
///
/// Ledger outcomes (confirmed, pending, failed) are not errors; they are
/// reported through [`AnchorResult`](crate::AnchorResult).
#[derive(Debug, Error)]
pub enum AnchorError {
    /// The request is malformed.
    #[error("invalid anchor request: {0}")]
    InvalidRequest(String),

    /// Another anchor or retry for this subject is in flight.
    #[error("anchor already in flight for subject: {0}")]
    SubjectBusy(String),

    /// Subject has no metadata record.
    #[error("no metadata for subject: {0}")]
    MetadataNotFound(String),

    /// Invalid configuration.
    #[error("invalid anchor configuration: {0}")]
    InvalidConfig(String),

    /// Core or storage error.
    #[error("core error: {0}")]
    Core(#[from] tracemark_core::Error),
}
