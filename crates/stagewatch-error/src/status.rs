//! Error status for retry logic

use std::fmt;

/// The status of an error, indicating whether it can be retried.
///
/// - `Permanent`: the server said no; polling again will not change it
/// - `Temporary`: waiting longer might succeed (e.g. a timeout)
/// - `Persistent`: was temporary but kept failing, stop retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorStatus {
    /// Error is permanent - don't retry without external changes.
    ///
    /// Examples: OperationFailed, CircularDependency, ConfigInvalid
    #[default]
    Permanent,

    /// Error is temporary - retry may succeed.
    ///
    /// Examples: Timeout, IoFailed
    Temporary,

    /// Error was temporary but persisted after retries.
    Persistent,
}

impl ErrorStatus {
    /// Check if retry is recommended
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorStatus::Temporary)
    }

    /// Mark as persistent after failed retries
    pub fn persist(self) -> Self {
        match self {
            ErrorStatus::Temporary => ErrorStatus::Persistent,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
            ErrorStatus::Persistent => "persistent",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
