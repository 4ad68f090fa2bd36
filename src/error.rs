//! Error handling module for afx
//!
//! Provides centralized error handling with proper error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for afx
#[derive(Error, Debug)]
pub enum AfxError {
    /// The state file exists but is not a valid record
    #[error("state file {path} is corrupt: {reason}")]
    StateCorrupt { path: PathBuf, reason: String },

    /// IO errors (reading or writing state, creating directories)
    #[error("{op} failed: {source}")]
    Io {
        op: String,
        #[source]
        source: std::io::Error,
    },

    /// Rewriting the state file failed; the previous record is intact
    #[error("failed to refresh state")]
    RefreshFailed(#[source] Box<AfxError>),

    /// An interactive prompt could not complete
    #[error("failed to get input from console for {what}: {reason}")]
    InputAborted { what: String, reason: String },

    /// The filter produced no line matching a known package
    #[error("no package matched the filter output")]
    SelectionNotFound,

    /// The filter command could not run or exited abnormally
    #[error("filter command '{command}' failed: {reason}")]
    FilterProcessFailed { command: String, reason: String },

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for afx operations
pub type Result<T> = std::result::Result<T, AfxError>;

// Convenient error constructors
impl AfxError {
    /// Wrap an IO error with the operation that produced it
    pub fn io(op: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            op: op.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a filter failure
    pub fn filter(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FilterProcessFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create an aborted-input error
    pub fn input_aborted(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::InputAborted {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the recoverable "user selected nothing" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SelectionNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = AfxError::config("duplicate package name: enhancd");
        assert_eq!(
            err.to_string(),
            "Configuration error: duplicate package name: enhancd"
        );

        let err = AfxError::filter("fzf", "exit status 130");
        assert_eq!(err.to_string(), "filter command 'fzf' failed: exit status 130");
    }

    #[test]
    fn test_refresh_failed_keeps_cause() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = AfxError::RefreshFailed(Box::new(AfxError::io("write state", io_err)));
        assert_eq!(err.to_string(), "failed to refresh state");
        let cause = err.source().expect("refresh error should expose its cause");
        assert_eq!(cause.to_string(), "write state failed: denied");
    }

    #[test]
    fn test_not_found_is_distinct_from_filter_failure() {
        assert!(AfxError::SelectionNotFound.is_not_found());
        assert!(!AfxError::filter("fzf", "not found").is_not_found());
    }
}
