//! Error types for decision automation.

use relay_core::error::RelayError;

/// A static decision rule could not evaluate its context.
///
/// The engine treats every rule error as "no answer" and moves on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("Missing context field: {0}")]
    MissingField(&'static str),
    #[error("Invalid context field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Saving or loading learned state failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<PersistenceError> for RelayError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Io(e) => RelayError::Io(e),
            PersistenceError::Encoding(e) => RelayError::Serialization(e.to_string()),
            PersistenceError::Backend(msg) => RelayError::Persistence(msg),
        }
    }
}
