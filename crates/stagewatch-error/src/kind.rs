//! Error kinds for stagewatch operations

use strum_macros::{Display, IntoStaticStr};

/// The kind of error that occurred.
///
/// Callers match on ErrorKind to tell a failed stage from a failed operation
/// from a wait that ran out of budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, Display)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration or parameters
    ConfigInvalid,

    // =========================================================================
    // Polling errors
    // =========================================================================
    /// A sub-condition resolved false; only its own stage is affected
    StageFailed,

    /// The terminal condition resolved false; the whole operation failed
    OperationFailed,

    /// The poll driver ran out of wait budget before a terminal state
    Timeout,

    // =========================================================================
    // Dependency errors
    // =========================================================================
    /// The dependency map contains a cycle
    CircularDependency,

    /// A dependency names a stage that was never declared
    UnknownStage,

    // =========================================================================
    // File/IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Serialization errors
    // =========================================================================
    /// Serialization failed
    SerializationFailed,

    /// Deserialization failed
    DeserializationFailed,

    // =========================================================================
    // Validation errors
    // =========================================================================
    /// Invalid argument passed to function
    InvalidArgument,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::IoFailed)
    }
}
